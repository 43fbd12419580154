use crate::api::StatusId;

error_chain!{
    errors {
        Initialization {
            description("failed to initialize client")
        }
        Uri(value: String) {
            description("invalid URI")
            display("could not parse URI: {}", value)
        }
        Network {
            description("network error")
        }
        StatusCode(status: hyper::StatusCode, body: String) {
            description("error returned from API")
            display("API returned {}: {}", status, body)
        }
        Decode(value: String) {
            description("invalid JSON")
            display("could not parse JSON:\n{}", value)
        }
        Storage(reason: String) {
            description("could not record page in the store")
            display("storage failure: {}", reason)
        }
        NoSuchPlaceholder(id: StatusId) {
            description("placeholder not found")
            display("no placeholder with id {}", id)
        }
        SessionClosed {
            description("timeline session was closed")
        }
    }
}

impl Error {
    /// Whether re-issuing the same request with the same anchor may succeed.
    pub fn is_retryable(&self) -> bool {
        match *self.kind() {
            ErrorKind::Network => true,
            ErrorKind::StatusCode(status, _) => {
                status.is_server_error() || status == hyper::StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }

    pub fn is_decode(&self) -> bool {
        match *self.kind() {
            ErrorKind::Decode(_) => true,
            _ => false,
        }
    }
}
