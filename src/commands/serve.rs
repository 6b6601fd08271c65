use crate::commands::Out;
use crate::{server, Config, Mode, Result};

/// Runs the webhook server on `port`, or on the configured port, until Ctrl-C.
pub async fn serve(config: Config, mode: Mode, port: Option<u16>) -> Result<Out<()>> {
    let port = port.unwrap_or(config.webhook().port);
    server::serve(config, mode, port).await?;
    Ok("The webhook server stopped".into())
}
