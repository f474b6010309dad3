use super::room::Room;
use super::session::handle_client;
use super::transcript::Transcript;
use crate::Result;
use crate::cmd::ServerConfig;
use std::{future::Future, net::SocketAddr, path::Path, sync::Arc};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

#[derive(Clone)]
pub struct ChatServer {
    pub room: Room,
    pub logo: Arc<str>,
}

/// Reads the banner shown to every client. Non UTF-8 bytes are replaced.
pub async fn load_logo(path: &Path) -> Result<Arc<str>> {
    let bytes = tokio::fs::read(path).await?;
    Ok(Arc::from(String::from_utf8_lossy(&bytes).as_ref()))
}

pub async fn run(config: ServerConfig, logo: Arc<str>) -> Result<()> {
    let listener = TcpListener::bind(config.address()).await?;
    info!("Server listening on {}", config.port);

    let server = ChatServer {
        room: Room::new(Transcript::persistent(&config.history_path)),
        logo,
    };
    serve(listener, server).await
}

pub async fn serve(listener: TcpListener, server: ChatServer) -> Result<()> {
    run_server_with_state(listener, server, |server, stream, address| {
        handle_client(server.room, server.logo, stream, address)
    })
    .await
}

/// Accept loop: one task per connection. Accept failures end the loop.
pub async fn run_server_with_state<H, S, F>(listener: TcpListener, state: S, handler: H) -> Result<()>
where
    S: Clone,
    H: Fn(S, TcpStream, SocketAddr) -> F,
    F: Future<Output = Result<()>> + Send + 'static,
{
    loop {
        let (socket, address) = listener.accept().await?;

        debug!("Got connection from {}", address);
        let future = handler(state.clone(), socket, address);
        tokio::task::spawn(async move {
            if let Err(err) = future.await {
                error!("Error handling connection {}: {}", address, err);
            }
            debug!("Closed connection from {}", address);
        });
    }
}
