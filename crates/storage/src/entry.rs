use std::collections::VecDeque;
use std::fmt;

use bytes::Bytes;
use tokio::time::{Duration, Instant};

/// Valor armazenado. O variant de uma entrada nunca muda depois de criada.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(Bytes),
    List(VecDeque<Bytes>),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::String(_) => ValueKind::String,
            Value::List(_) => ValueKind::List,
        }
    }
}

/// Tipo de uma chave, como reportado por `TYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    List,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::List => "list",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// TTL restante de uma chave viva.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Sem expiração. Exposto como `-1` no protocolo.
    Persistent,
    Remaining(Duration),
}

/// Entrada no store: valor + instante de expiração opcional.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub value: Value,
    pub expires_at: Option<Instant>,
}

impl Entry {
    pub fn new(value: Value, expires_at: Option<Instant>) -> Self {
        Self { value, expires_at }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|t| now >= t)
    }
}

/// Converte um TTL relativo em instante absoluto. Zero significa sem expiração;
/// um TTL grande demais para o relógio também.
pub(crate) fn deadline(ttl: Duration) -> Option<Instant> {
    if ttl.is_zero() {
        return None;
    }
    Instant::now().checked_add(ttl)
}
