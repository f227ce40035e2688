use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::{Semaphore, broadcast};
use tracing::{error, info};

use tidekv_common::{DEFAULT_HOST, DEFAULT_PORT, DEFAULT_REAPER_INTERVAL_MS, MAX_CONNECTIONS};
use tidekv_server::{Connection, handle_connection};
use tidekv_storage::Db;

#[derive(Parser, Debug)]
#[command(name = "tidekv-server", about = "TideKV, key/value in-memory com TTL")]
struct Args {
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,
    #[arg(long, default_value_t = MAX_CONNECTIONS)]
    max_connections: usize,
    /// Intervalo da varredura de chaves expiradas, em ms. `0` desabilita.
    #[arg(long, default_value_t = DEFAULT_REAPER_INTERVAL_MS)]
    reaper_interval_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tidekv_server=info,tidekv_storage=info".into()),
        )
        .init();

    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    let db = Db::new();
    let mut reaper = db.start_reaper(Duration::from_millis(args.reaper_interval_ms));

    let listener = TcpListener::bind(&addr).await?;
    info!("TideKV escutando em {addr}");

    let semaphore = Arc::new(Semaphore::new(args.max_connections));
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    loop {
        let permit = tokio::select! {
            permit = semaphore.clone().acquire_owned() => permit?,
            _ = signal::ctrl_c() => break,
        };

        let (socket, peer) = tokio::select! {
            result = listener.accept() => match result {
                Ok(v) => v,
                Err(e) => {
                    error!("erro ao aceitar conexão: {e}");
                    continue;
                }
            },
            _ = signal::ctrl_c() => break,
        };

        info!("nova conexão: {peer}");
        let db = db.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();

        tokio::spawn(async move {
            let conn = Connection::new(socket);
            if let Err(e) = handle_connection(conn, db, &mut shutdown_rx).await {
                error!("erro na conexão {peer}: {e}");
            }
            info!("conexão encerrada: {peer}");
            drop(permit);
        });
    }

    info!("shutdown signal recebido");
    drop(shutdown_tx);
    reaper.stop().await;

    Ok(())
}
