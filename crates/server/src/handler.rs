use tokio::sync::broadcast;
use tracing::debug;

use tidekv_common::{ConnectionError, StorageError};
use tidekv_protocol::{Command, Frame};
use tidekv_storage::{Db, Ttl};

use crate::Connection;

/// Loop principal de tratamento de uma conexão.
pub async fn handle_connection(
    mut conn: Connection,
    db: Db,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<(), ConnectionError> {
    loop {
        let read = tokio::select! {
            result = conn.read_frame() => result,
            _ = shutdown.recv() => return Ok(()),
        };

        let frame = match read {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(()), // EOF
            Err(ConnectionError::Protocol(e)) => {
                // O buffer não tem mais fronteira confiável: responde e fecha
                let _ = conn.write_frame(&Frame::Error(format!("ERR {e}"))).await;
                return Err(e.into());
            }
            Err(e) => return Err(e),
        };

        let response = match Command::from_frame(frame) {
            Ok(cmd) => {
                debug!("comando recebido: {}", cmd.name());
                execute_command(&cmd, &db)
            }
            Err(e) => Frame::Error(format!("ERR {e}")),
        };

        conn.write_frame(&response).await?;
    }
}

/// Executa um comando contra o store e monta a resposta.
pub fn execute_command(cmd: &Command, db: &Db) -> Frame {
    match cmd {
        Command::Ping(msg) => match msg {
            Some(m) => Frame::Bulk(m.clone()),
            None => Frame::Simple("PONG".into()),
        },
        Command::Echo(msg) => Frame::Bulk(msg.clone()),
        Command::Get(key) => db.get(key).map_or(Frame::Null, Frame::Bulk),
        Command::Set { key, value, expire } => {
            match expire {
                Some(ttl) => db.set_with_ttl(key.clone(), value.clone(), *ttl),
                None => db.set(key.clone(), value.clone()),
            }
            Frame::ok()
        }
        Command::Update { key, value } => ok_or_error(db.update(key, value.clone())),
        Command::LPush { key, value } => length_reply(db.push_front(key, value.clone())),
        Command::RPush { key, value } => length_reply(db.push_back(key, value.clone())),
        Command::LPop(key) => db.pop_front(key).map_or(Frame::Null, Frame::Bulk),
        Command::RPop(key) => db.pop_back(key).map_or(Frame::Null, Frame::Bulk),
        Command::LRange { key, start, stop } => match db.list_range(key, *start, *stop) {
            Ok(items) => Frame::Array(items.into_iter().map(Frame::Bulk).collect()),
            Err(e) => storage_error(e),
        },
        Command::LLen(key) => length_reply(db.list_len(key)),
        Command::Expire { key, ttl } => ok_or_error(db.set_ttl(key, *ttl)),
        Command::Ttl(key) => ttl_reply(db.get_ttl(key), |d| d.as_secs()),
        Command::PTtl(key) => ttl_reply(db.get_ttl(key), |d| d.as_millis() as u64),
        Command::Persist(key) => ok_or_error(db.remove_ttl(key)),
        Command::Del(keys) => {
            let removed = keys.iter().filter(|key| db.remove(key).is_ok()).count();
            Frame::Integer(removed as i64)
        }
        Command::Exists(keys) => {
            let found = keys.iter().filter(|key| db.exists(key)).count();
            Frame::Integer(found as i64)
        }
        Command::Type(key) => {
            let kind = db.key_type(key).map_or("none", |kind| kind.as_str());
            Frame::Simple(kind.into())
        }
        Command::FlushDb => {
            db.clear();
            Frame::ok()
        }
        Command::DbSize => Frame::Integer(db.len() as i64),
        Command::Unknown(name) => Frame::Error(format!("ERR unknown command '{name}'")),
    }
}

fn storage_error(err: StorageError) -> Frame {
    match err {
        StorageError::KeyNotFound => Frame::Error("ERR no such key".into()),
        StorageError::TypeMismatch => Frame::Error(
            "WRONGTYPE Operation against a key holding the wrong kind of value".into(),
        ),
    }
}

fn ok_or_error(result: Result<(), StorageError>) -> Frame {
    result.map_or_else(storage_error, |()| Frame::ok())
}

fn length_reply(result: Result<usize, StorageError>) -> Frame {
    result.map_or_else(storage_error, |len| Frame::Integer(len as i64))
}

/// `-1` para chave sem expiração, nulo para chave ausente.
fn ttl_reply(ttl: Option<Ttl>, unit: fn(std::time::Duration) -> u64) -> Frame {
    match ttl {
        None => Frame::Null,
        Some(Ttl::Persistent) => Frame::Integer(-1),
        Some(Ttl::Remaining(left)) => Frame::Integer(unit(left) as i64),
    }
}
