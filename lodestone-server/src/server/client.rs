use crate::cluster::AdminConsole;
use crate::core::KVStore;
use crate::protocol::{Command, Request, Response};
use crate::replication::ReplicationCoordinator;
use crate::transport::Transport;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Accept loop for the client endpoint. Binding errors are returned to the
/// caller; they are fatal at startup.
pub async fn run_client_listener<T: Transport>(
    addr: SocketAddr,
    store: Arc<KVStore>,
    coordinator: Arc<ReplicationCoordinator<T>>,
    console: Arc<AdminConsole<T>>,
    running: Arc<AtomicBool>,
) -> io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Client endpoint listening on {}", addr);

    while running.load(Ordering::SeqCst) {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Failed to accept client connection: {}", e);
                continue;
            }
        };

        debug!("Client connection from {}", peer_addr);
        let store = Arc::clone(&store);
        let coordinator = Arc::clone(&coordinator);
        let console = Arc::clone(&console);

        tokio::spawn(async move {
            if let Err(e) = serve_client(stream, store, coordinator, console).await {
                debug!("Client connection {} closed: {}", peer_addr, e);
            }
        });
    }

    Ok(())
}

async fn serve_client<T: Transport>(
    stream: TcpStream,
    store: Arc<KVStore>,
    coordinator: Arc<ReplicationCoordinator<T>>,
    console: Arc<AdminConsole<T>>,
) -> io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        let (reply, quit) = dispatch(&line, &store, &coordinator, &console);
        writer.write_all(reply.as_bytes()).await?;
        writer.flush().await?;

        if quit {
            break;
        }
    }

    Ok(())
}

/// Route one request line to its reply; the bool signals connection close
fn dispatch<T: Transport>(
    line: &str,
    store: &KVStore,
    coordinator: &ReplicationCoordinator<T>,
    console: &AdminConsole<T>,
) -> (String, bool) {
    let request = Request::parse(line);

    let response = match request.command {
        Command::Set => match request.args.as_slice() {
            [key, value] => match coordinator.handle_write(key, value, false) {
                Ok(_) => Response::ok(),
                Err(e) => Response::error(e.to_string()),
            },
            _ => Response::error("Usage: SET <key> <value>"),
        },
        Command::Get => match request.args.first() {
            Some(key) => match store.get(key) {
                Some(value) => Response::ok_with("", value),
                None => Response::error("Key not found"),
            },
            None => Response::error("Usage: GET <key>"),
        },
        Command::Del => match request.args.first() {
            Some(key) => match coordinator.handle_write(key, "", true) {
                Ok(_) => Response::ok(),
                Err(e) => Response::error(e.to_string()),
            },
            None => Response::error("Usage: DEL <key>"),
        },
        Command::Exists => match request.args.first() {
            Some(key) => Response::ok_with("", if store.exists(key) { "1" } else { "0" }),
            None => Response::error("Usage: EXISTS <key>"),
        },
        Command::Ping => Response::ok_with("PONG", ""),
        Command::Quit => return (Response::ok_with("bye", "").format(), true),
        // Anything else goes to the admin console, which renders its own
        // reply shape.
        Command::Unknown => {
            let mut reply = console.handle_command(line);
            reply.push('\n');
            return (reply, false);
        }
    };

    (response.format(), false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{FailoverController, HeartbeatConfig, HeartbeatMonitor};
    use crate::core::KVConfig;
    use crate::replication::{MutationLog, ReplicationConfig};
    use crate::transport::MemoryTransport;

    struct Fixture {
        store: Arc<KVStore>,
        coordinator: Arc<ReplicationCoordinator<MemoryTransport>>,
        console: Arc<AdminConsole<MemoryTransport>>,
    }

    fn fixture() -> Fixture {
        let transport = Arc::new(MemoryTransport::new());
        let store = Arc::new(KVStore::new(KVConfig::default()));
        let log = Arc::new(MutationLog::new());
        let coordinator = Arc::new(
            ReplicationCoordinator::new(
                "node-1",
                ReplicationConfig::default(),
                Arc::clone(&store),
                log,
                Arc::clone(&transport),
            )
            .unwrap(),
        );
        let failover = Arc::new(FailoverController::new("node-1", 3000));
        let monitor = Arc::new(HeartbeatMonitor::new(
            "node-1",
            HeartbeatConfig::default(),
            transport,
        ));
        let console = Arc::new(AdminConsole::new(
            failover,
            Arc::clone(&coordinator),
            monitor,
        ));

        Fixture {
            store,
            coordinator,
            console,
        }
    }

    fn run(fixture: &Fixture, line: &str) -> String {
        dispatch(line, &fixture.store, &fixture.coordinator, &fixture.console).0
    }

    #[test]
    fn test_set_get_del_round_trip() {
        let f = fixture();

        assert_eq!(run(&f, "SET user:1 alice"), "OK\n");
        assert_eq!(run(&f, "GET user:1"), "OK alice\n");
        assert_eq!(run(&f, "EXISTS user:1"), "OK 1\n");
        assert_eq!(run(&f, "DEL user:1"), "OK\n");
        assert_eq!(run(&f, "GET user:1"), "ERROR Key not found\n");
        assert_eq!(run(&f, "EXISTS user:1"), "OK 0\n");

        // the write path went through the log
        assert_eq!(f.coordinator.status().last_log_id, 2);
    }

    #[test]
    fn test_malformed_requests() {
        let f = fixture();

        assert_eq!(run(&f, "SET onlykey"), "ERROR Usage: SET <key> <value>\n");
        assert_eq!(run(&f, "GET"), "ERROR Usage: GET <key>\n");
        assert_eq!(run(&f, "PING"), "OK PONG\n");
    }

    #[test]
    fn test_quit_closes_connection() {
        let f = fixture();
        let (reply, quit) = dispatch("QUIT", &f.store, &f.coordinator, &f.console);
        assert_eq!(reply, "OK bye\n");
        assert!(quit);
    }

    #[test]
    fn test_unknown_command_falls_through_to_admin() {
        let f = fixture();
        assert_eq!(run(&f, "ping"), "OK PONG\n"); // client PING, case-insensitive
        assert_eq!(run(&f, "status").lines().next().unwrap(), "Node Status:");
        assert_eq!(run(&f, "frob"), "ERROR: Unknown command: frob\n");
    }
}
