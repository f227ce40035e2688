use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::Db;

/// Handle da varredura ativa de chaves expiradas.
///
/// A expiração lazy já garante que nenhum valor expirado é retornado; o reaper
/// só devolve a memória de chaves que ninguém mais acessa.
pub struct Reaper {
    shutdown: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl Reaper {
    pub(crate) fn spawn(db: Db, every: Duration) -> Self {
        if every.is_zero() {
            info!("reaper desabilitado (intervalo zero)");
            return Self::disabled();
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run(db, every, shutdown_rx));
        info!("reaper iniciado, intervalo {every:?}");

        Self {
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    /// Reaper que não varre nada.
    pub fn disabled() -> Self {
        Self {
            shutdown: None,
            task: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Sinaliza a parada e aguarda a task terminar. Uma varredura em andamento
    /// termina antes. Chamadas repetidas não fazem nada.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("reaper terminou com erro: {e}");
            }
            info!("reaper encerrado");
        }
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        // Sem join aqui: só garante que a task não sobrevive ao handle
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }
    }
}

async fn run(db: Db, every: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // O primeiro tick é imediato
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let removed = db.purge_expired();
                if removed > 0 {
                    debug!("{removed} keys expiradas removidas pelo reaper");
                }
            }
            // Err = sender dropado, tratado como parada
            _ = shutdown.changed() => break,
        }
    }
}
