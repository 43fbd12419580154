#[macro_use]
extern crate error_chain;

use futures::StreamExt;
use olifants_timeline::entry::FeedEntry;
use olifants_timeline::error::*;
use olifants_timeline::{Client, FeedKind, LoadType, SessionConfig, StatusStore, Timeline};
use std::sync::Arc;

quick_main!(|| -> Result<()> {
    env_logger::init();

    let instance_url = "https://mastodon.social";
    let access_token = "";

    let runtime = tokio::runtime::Runtime::new().chain_err(|| "could not create runtime")?;
    let client = Client::new(instance_url, access_token, "olifants").chain_err(
        || "could not create Client",
    )?;

    let store = Arc::new(StatusStore::new());
    let timeline = Timeline::new(
        Arc::new(client),
        store,
        "me@mastodon.social",
        FeedKind::Home,
        SessionConfig::default(),
    );

    runtime.block_on(async {
        timeline.refresh().await?;
        timeline.load_more(LoadType::Append).await?;

        let mut windows = timeline.windows();
        if let Some(window) = windows.next().await {
            for entry in window?.entries {
                match entry {
                    FeedEntry::Concrete(concrete) => {
                        let status = concrete.status.actionable();
                        println!("{} @{}: {}", status.id, status.account.acct, status.content);
                    }
                    FeedEntry::Placeholder { id, .. } => println!("{} (gap)", id),
                }
            }
        }

        timeline.close();
        Ok::<(), Error>(())
    })
});
