/// Erros de parsing do protocolo RESP.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("frame incompleto")]
    Incomplete,
    #[error("byte de tipo inválido: {0:#x}")]
    InvalidFrameType(u8),
    #[error("inteiro inválido: {0}")]
    InvalidInteger(String),
    #[error("comprimento inválido: {0}")]
    InvalidLength(i64),
    #[error("frame excede tamanho máximo ({0} bytes)")]
    FrameTooLarge(usize),
    #[error("encoding inválido: {0}")]
    InvalidEncoding(String),
    #[error("aninhamento excede {0} níveis")]
    TooDeep(usize),
}

/// Erros do engine de armazenamento.
///
/// Ausência em operações de leitura tipadas (`get`, `pop_*`, `get_ttl`,
/// `key_type`) é sinalizada por `Option`, não por estes erros.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("chave não encontrada")]
    KeyNotFound,
    #[error("operação contra chave com tipo errado")]
    TypeMismatch,
}

/// Erros de conexão TCP.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("conexão resetada pelo peer")]
    ConnectionReset,
    #[error("protocolo: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Erros de parsing/validação de comandos.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("número errado de argumentos para '{0}'")]
    WrongArity(String),
    #[error("opção inválida para SET: {0}")]
    InvalidSetOption(String),
    #[error("argumento inválido: {0}")]
    InvalidArgument(String),
}
