//! Check command - test connectivity to both directories

use std::sync::Arc;

use clap::Args;
use tracing::debug;

use dirsync_connector::dn::DistinguishedName;
use dirsync_connector::traits::EntryStore;

use super::ConfigArgs;
use crate::error::CliResult;

/// Arguments for the check command
#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
}

/// Execute the check command
pub async fn execute(args: CheckArgs) -> CliResult<()> {
    let file = args.config.load()?;
    let (source, target) = file.stores()?;

    for (role, store) in [("source", source), ("target", target)] {
        let subtree = probe(&store).await?;
        println!(
            "{role}: {} reachable (subtree delete: {})",
            store.display_name(),
            if subtree { "yes" } else { "no" }
        );
    }
    Ok(())
}

/// Bind at the root context and ask for subtree delete support.
async fn probe(store: &Arc<dyn EntryStore>) -> CliResult<bool> {
    let mut session = store.connect(&DistinguishedName::root()).await?;
    let result = store.supports_subtree_delete(&mut session).await;
    store.disconnect(session).await;
    debug!(store = store.display_name(), "Probe finished");
    Ok(result?)
}
