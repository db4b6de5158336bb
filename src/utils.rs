use std::time::Duration;

/// Interval between liveness checks of the master connection
pub(crate) const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// Watches the SSH master connection backing an SFTP client.
///
/// Resolves only with an error, once `session.check()` fails, so the SFTP
/// client fails any in-flight write instead of waiting on a dead socket.
pub(crate) fn check_connection<'session>(
    session: &'session openssh::Session,
) -> std::pin::Pin<
    Box<dyn std::future::Future<Output = Result<(), openssh::Error>> + Send + Sync + 'session>,
> {
    Box::pin(async move {
        loop {
            tokio::time::sleep(KEEPALIVE_INTERVAL).await;
            session.check().await?;
        }
        #[allow(unreachable_code)]
        Ok(())
    })
}
