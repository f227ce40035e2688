use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::time::{Duration, Instant};
use tracing::debug;

use tidekv_common::StorageError;

use crate::entry::{Entry, Ttl, Value, ValueKind, deadline};
use crate::reaper::Reaper;

/// Estado compartilhado entre todas as conexões e o reaper.
///
/// Um único `RwLock` guarda o keyspace inteiro: leituras tomam o lock
/// compartilhado, qualquer criação, mutação ou remoção toma o exclusivo.
struct SharedState {
    entries: RwLock<HashMap<String, Entry>>,
}

/// Handle para o banco de dados in-memory.
///
/// Clonar o handle é barato e todos os clones enxergam o mesmo keyspace.
/// Cada `Db::new()` cria um store independente.
#[derive(Clone)]
pub struct Db {
    shared: Arc<SharedState>,
}

impl Db {
    pub fn new() -> Self {
        Db {
            shared: Arc::new(SharedState {
                entries: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Inicia a varredura ativa de chaves expiradas. Intervalo zero devolve
    /// um reaper inerte.
    pub fn start_reaper(&self, every: Duration) -> Reaper {
        Reaper::spawn(self.clone(), every)
    }

    // --- String operations ---

    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.read_live(key, |entry| match &entry.value {
            Value::String(data) => Some(data.clone()),
            Value::List(_) => None,
        })
        .flatten()
    }

    pub fn set(&self, key: String, value: Bytes) {
        self.insert(key, Value::String(value), None);
    }

    /// Como `set`, mas a chave expira após `ttl`. TTL zero grava sem expiração.
    pub fn set_with_ttl(&self, key: String, value: Bytes, ttl: Duration) {
        self.insert(key, Value::String(value), deadline(ttl));
    }

    /// Substitui o valor de uma string existente, preservando o TTL.
    pub fn update(&self, key: &str, value: Bytes) -> Result<(), StorageError> {
        let mut entries = self.shared.entries.write();
        let entry = live_mut(&mut entries, key).ok_or(StorageError::KeyNotFound)?;

        match &mut entry.value {
            Value::String(data) => {
                *data = value;
                Ok(())
            }
            Value::List(_) => Err(StorageError::TypeMismatch),
        }
    }

    // --- List operations ---

    pub fn push_front(&self, key: &str, value: Bytes) -> Result<usize, StorageError> {
        self.list_push(key, value, true)
    }

    pub fn push_back(&self, key: &str, value: Bytes) -> Result<usize, StorageError> {
        self.list_push(key, value, false)
    }

    fn list_push(&self, key: &str, value: Bytes, front: bool) -> Result<usize, StorageError> {
        let mut entries = self.shared.entries.write();

        match live_mut(&mut entries, key) {
            Some(entry) => match &mut entry.value {
                Value::List(list) => {
                    if front {
                        list.push_front(value);
                    } else {
                        list.push_back(value);
                    }
                    Ok(list.len())
                }
                Value::String(_) => Err(StorageError::TypeMismatch),
            },
            None => {
                // Chave ausente ou expirada: nova lista sem TTL
                let list = VecDeque::from([value]);
                entries.insert(key.to_string(), Entry::new(Value::List(list), None));
                Ok(1)
            }
        }
    }

    pub fn pop_front(&self, key: &str) -> Option<Bytes> {
        self.list_pop(key, true)
    }

    pub fn pop_back(&self, key: &str) -> Option<Bytes> {
        self.list_pop(key, false)
    }

    /// Lista que fica vazia continua existindo: vazia e ausente são estados
    /// distintos.
    fn list_pop(&self, key: &str, front: bool) -> Option<Bytes> {
        let mut entries = self.shared.entries.write();

        match &mut live_mut(&mut entries, key)?.value {
            Value::List(list) => {
                if front {
                    list.pop_front()
                } else {
                    list.pop_back()
                }
            }
            Value::String(_) => None,
        }
    }

    /// Retorna os elementos entre `start` e `end`, inclusivos.
    ///
    /// Índices negativos contam a partir do fim (`-1` é o último). Depois de
    /// resolvidos, `start` é limitado a 0 e `end` a `len - 1`; um intervalo
    /// vazio resulta em lista vazia, não em erro.
    pub fn list_range(
        &self,
        key: &str,
        start: i64,
        end: i64,
    ) -> Result<Vec<Bytes>, StorageError> {
        self.read_live(key, |entry| match &entry.value {
            Value::List(list) => Ok(slice_range(list, start, end)),
            Value::String(_) => Err(StorageError::TypeMismatch),
        })
        .unwrap_or(Err(StorageError::KeyNotFound))
    }

    pub fn list_len(&self, key: &str) -> Result<usize, StorageError> {
        self.read_live(key, |entry| match &entry.value {
            Value::List(list) => Ok(list.len()),
            Value::String(_) => Err(StorageError::TypeMismatch),
        })
        .unwrap_or(Err(StorageError::KeyNotFound))
    }

    // --- TTL operations ---

    /// Define o TTL de uma chave viva de qualquer tipo. `Duration::ZERO`
    /// torna a chave persistente.
    pub fn set_ttl(&self, key: &str, ttl: Duration) -> Result<(), StorageError> {
        let mut entries = self.shared.entries.write();
        let entry = live_mut(&mut entries, key).ok_or(StorageError::KeyNotFound)?;
        entry.expires_at = deadline(ttl);
        Ok(())
    }

    pub fn get_ttl(&self, key: &str) -> Option<Ttl> {
        self.read_live(key, |entry| match entry.expires_at {
            None => Some(Ttl::Persistent),
            Some(when) => {
                let remaining = when.saturating_duration_since(Instant::now());
                // Expirou entre a checagem e o cálculo
                (!remaining.is_zero()).then_some(Ttl::Remaining(remaining))
            }
        })
        .flatten()
    }

    pub fn remove_ttl(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.shared.entries.write();
        let entry = live_mut(&mut entries, key).ok_or(StorageError::KeyNotFound)?;
        entry.expires_at = None;
        Ok(())
    }

    // --- General operations ---

    /// Remove a chave. Uma chave expirada ainda não varrida também é removida,
    /// mas reportada como `KeyNotFound`, igual a `get`/`exists`.
    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.shared.entries.write();
        match entries.remove(key) {
            Some(entry) if !entry.is_expired() => Ok(()),
            _ => Err(StorageError::KeyNotFound),
        }
    }

    pub fn exists(&self, key: &str) -> bool {
        self.read_live(key, |_| ()).is_some()
    }

    pub fn key_type(&self, key: &str) -> Option<ValueKind> {
        self.read_live(key, |entry| entry.value.kind())
    }

    pub fn clear(&self) {
        self.shared.entries.write().clear();
    }

    /// Número de chaves vivas. Não remove as expiradas.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.shared
            .entries
            .read()
            .values()
            .filter(|entry| !entry.is_expired_at(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Varre o keyspace inteiro sob o write lock e remove as chaves expiradas.
    /// Retorna quantas foram removidas.
    ///
    /// O lock exclusivo fica retido durante toda a varredura; com muitas
    /// chaves isso adiciona latência às demais operações.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.shared.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        before - entries.len()
    }

    fn insert(&self, key: String, value: Value, expires_at: Option<Instant>) {
        self.shared
            .entries
            .write()
            .insert(key, Entry::new(value, expires_at));
    }

    /// Aplica `f` à entrada viva sob o read lock.
    ///
    /// Se a entrada estiver expirada, o read lock é solto antes de tomar o
    /// write lock para removê-la, e a remoção só acontece se a entrada ainda
    /// estiver expirada: outro caller pode tê-la removido ou sobrescrito.
    fn read_live<R>(&self, key: &str, f: impl FnOnce(&Entry) -> R) -> Option<R> {
        {
            let entries = self.shared.entries.read();
            match entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired() => return Some(f(entry)),
                Some(_) => {}
            }
        }

        let mut entries = self.shared.entries.write();
        if entries.get(key).is_some_and(Entry::is_expired) {
            entries.remove(key);
            debug!("key expirada removida no acesso: {key}");
        }
        None
    }
}

impl Default for Db {
    fn default() -> Self {
        Self::new()
    }
}

/// Entrada viva para mutação. Com o write lock já tomado, remove a entrada se
/// ela estiver expirada.
fn live_mut<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
    if entries.get(key).is_some_and(Entry::is_expired) {
        entries.remove(key);
        debug!("key expirada removida no acesso: {key}");
        return None;
    }
    entries.get_mut(key)
}

fn slice_range(list: &VecDeque<Bytes>, start: i64, end: i64) -> Vec<Bytes> {
    let len = list.len() as i64;
    let start = (if start < 0 { len + start } else { start }).max(0);
    let end = (if end < 0 { len + end } else { end }).min(len - 1);

    if start > end || start >= len {
        return Vec::new();
    }

    list.iter()
        .skip(start as usize)
        .take((end - start + 1) as usize)
        .cloned()
        .collect()
}
