use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use common::error::ApiError;
use common::schemas::{Reply, Request};
use common::wire::{read_message, write_message};

use crate::core::state::CoordinatorState;

/// Accepts protocol connections until `shutdown` flips to true.
pub async fn serve_protocol(
    listener: TcpListener,
    state: CoordinatorState,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    info!("protocol listening on {}", listener.local_addr()?);

    loop {
        let (stream, peer) = tokio::select! {
            res = listener.accept() => match res {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("accept failed: {e}");
                    continue;
                }
            },
            _ = shutdown.changed() => {
                if *shutdown.borrow() { break; }
                continue;
            }
        };

        let state = state.clone();
        tokio::spawn(async move {
            // connections past the cap wait here for a permit
            let _permit = match state.connections.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    warn!("connection limiter closed: {e}");
                    return;
                }
            };
            handle_connection(stream, peer, &state).await;
        });
    }

    info!("protocol listener stopped");

    Ok(())
}

#[tracing::instrument(name = "coord.exchange", skip(stream, state))]
async fn handle_connection(mut stream: TcpStream, peer: SocketAddr, state: &CoordinatorState) {
    let exchange = async {
        let reply = match read_message::<Request, _>(&mut stream).await {
            Ok(req) => {
                debug!(action = req.action(), node_id = %req.node_id(), "request");
                state.handle(req)
            }
            Err(e) => {
                warn!("rejected request: {e}");
                Reply::from_error(&e)
            }
        };
        write_message(&mut stream, &reply).await
    };

    let outcome = timeout(state.io_timeout, exchange).await;
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("failed to reply: {e}"),
        Err(_) => {
            let err = ApiError::Protocol("request timed out".into());
            warn!("{err}");
            let reply = Reply::from_error(&err);
            let _ = timeout(state.io_timeout, write_message(&mut stream, &reply)).await;
        }
    }
}
