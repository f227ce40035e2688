use bytes::Bytes;
use std::time::Duration;
use tidekv_common::CommandError;

use crate::{Frame, Parse};

/// Comandos suportados.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ping(Option<Bytes>),
    Echo(Bytes),
    Get(String),
    /// `SET key value [EX s | PX ms]`. `expire` é sempre positivo quando presente.
    Set {
        key: String,
        value: Bytes,
        expire: Option<Duration>,
    },
    /// Sobrescreve uma string existente mantendo o TTL.
    Update {
        key: String,
        value: Bytes,
    },
    LPush {
        key: String,
        value: Bytes,
    },
    RPush {
        key: String,
        value: Bytes,
    },
    LPop(String),
    RPop(String),
    LRange {
        key: String,
        start: i64,
        stop: i64,
    },
    LLen(String),
    /// `EXPIRE`/`PEXPIRE`. TTL zero remove a expiração.
    Expire {
        key: String,
        ttl: Duration,
    },
    Ttl(String),
    PTtl(String),
    Persist(String),
    Del(Vec<String>),
    Exists(Vec<String>),
    Type(String),
    FlushDb,
    DbSize,
    Unknown(String),
}

impl Command {
    /// Faz o parse de um Frame em um Command.
    pub fn from_frame(frame: Frame) -> Result<Command, CommandError> {
        let mut parse = Parse::new(frame)?;

        let name = parse.command().to_string();
        let cmd = match name.as_str() {
            "PING" => {
                let msg = if parse.has_remaining() {
                    Some(parse.next_bytes()?)
                } else {
                    None
                };
                Command::Ping(msg)
            }
            "ECHO" => Command::Echo(parse.next_bytes()?),
            "GET" => Command::Get(parse.next_key()?),
            "SET" => parse_set(&mut parse)?,
            "UPDATE" => Command::Update {
                key: parse.next_key()?,
                value: parse.next_bytes()?,
            },
            "LPUSH" => Command::LPush {
                key: parse.next_key()?,
                value: parse.next_bytes()?,
            },
            "RPUSH" => Command::RPush {
                key: parse.next_key()?,
                value: parse.next_bytes()?,
            },
            "LPOP" => Command::LPop(parse.next_key()?),
            "RPOP" => Command::RPop(parse.next_key()?),
            "LRANGE" => Command::LRange {
                key: parse.next_key()?,
                start: parse.next_int()?,
                stop: parse.next_int()?,
            },
            "LLEN" => Command::LLen(parse.next_key()?),
            "EXPIRE" => Command::Expire {
                key: parse.next_key()?,
                ttl: non_negative(parse.next_int()?, Duration::from_secs),
            },
            "PEXPIRE" => Command::Expire {
                key: parse.next_key()?,
                ttl: non_negative(parse.next_int()?, Duration::from_millis),
            },
            "TTL" => Command::Ttl(parse.next_key()?),
            "PTTL" => Command::PTtl(parse.next_key()?),
            "PERSIST" => Command::Persist(parse.next_key()?),
            "DEL" => Command::Del(parse.rest_keys()?),
            "EXISTS" => Command::Exists(parse.rest_keys()?),
            "TYPE" => Command::Type(parse.next_key()?),
            "FLUSHDB" => Command::FlushDb,
            "DBSIZE" => Command::DbSize,
            other => return Ok(Command::Unknown(other.to_string())),
        };

        parse.finish()?;
        Ok(cmd)
    }

    /// Nome do comando, para logs.
    pub fn name(&self) -> &str {
        match self {
            Command::Ping(_) => "PING",
            Command::Echo(_) => "ECHO",
            Command::Get(_) => "GET",
            Command::Set { .. } => "SET",
            Command::Update { .. } => "UPDATE",
            Command::LPush { .. } => "LPUSH",
            Command::RPush { .. } => "RPUSH",
            Command::LPop(_) => "LPOP",
            Command::RPop(_) => "RPOP",
            Command::LRange { .. } => "LRANGE",
            Command::LLen(_) => "LLEN",
            Command::Expire { .. } => "EXPIRE",
            Command::Ttl(_) => "TTL",
            Command::PTtl(_) => "PTTL",
            Command::Persist(_) => "PERSIST",
            Command::Del(_) => "DEL",
            Command::Exists(_) => "EXISTS",
            Command::Type(_) => "TYPE",
            Command::FlushDb => "FLUSHDB",
            Command::DbSize => "DBSIZE",
            Command::Unknown(name) => name,
        }
    }
}

/// Converte um TTL do protocolo. Valores `<= 0` viram zero (sem expiração).
fn non_negative(n: i64, unit: fn(u64) -> Duration) -> Duration {
    if n <= 0 { Duration::ZERO } else { unit(n as u64) }
}

fn parse_set(parse: &mut Parse) -> Result<Command, CommandError> {
    let key = parse.next_key()?;
    let value = parse.next_bytes()?;
    let mut expire = None;

    while parse.has_remaining() {
        let opt = parse.next_string()?.to_uppercase();
        let unit: fn(u64) -> Duration = match opt.as_str() {
            "EX" => Duration::from_secs,
            "PX" => Duration::from_millis,
            other => return Err(CommandError::InvalidSetOption(other.to_string())),
        };

        let n = parse.next_int()?;
        if n <= 0 {
            return Err(CommandError::InvalidSetOption(format!(
                "{opt} deve ser positivo"
            )));
        }
        expire = Some(unit(n as u64));
    }

    Ok(Command::Set { key, value, expire })
}
