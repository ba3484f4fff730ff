use crate::cli::{actions::Action, globals::GlobalArgs};
use crate::entrada::new;
use anyhow::Result;
use url::Url;

/// Handle the server action
pub async fn handle(action: Action, globals: &GlobalArgs) -> Result<()> {
    match action {
        Action::Server { port, dsn } => {
            // Fail early on malformed connection strings
            let dsn = Url::parse(&dsn)?;

            new(port, dsn.to_string(), globals).await?;
        }
    }

    Ok(())
}
