use bytes::Bytes;
use std::vec;
use tidekv_common::CommandError;

use crate::Frame;

/// Cursor sobre os argumentos de um comando.
///
/// O primeiro elemento do array é lido na construção como nome do comando
/// (em maiúsculas), usado nas mensagens de aridade.
pub struct Parse {
    name: String,
    parts: vec::IntoIter<Frame>,
}

impl Parse {
    /// O frame deve ser um Array não vazio.
    pub fn new(frame: Frame) -> Result<Parse, CommandError> {
        let mut parts = match frame {
            Frame::Array(parts) => parts.into_iter(),
            _ => return Err(CommandError::InvalidArgument("esperado array".into())),
        };

        let name = match parts.next() {
            Some(Frame::Bulk(data)) => String::from_utf8_lossy(&data).to_uppercase(),
            Some(Frame::Simple(s)) => s.to_uppercase(),
            Some(_) => {
                return Err(CommandError::InvalidArgument(
                    "nome de comando deve ser string".into(),
                ));
            }
            None => return Err(CommandError::InvalidArgument("comando vazio".into())),
        };

        Ok(Parse { name, parts })
    }

    /// Nome do comando em maiúsculas.
    pub fn command(&self) -> &str {
        &self.name
    }

    /// Próximo argumento como String UTF-8.
    pub fn next_string(&mut self) -> Result<String, CommandError> {
        match self.next()? {
            Frame::Simple(s) => Ok(s),
            Frame::Bulk(data) => String::from_utf8(data.to_vec())
                .map_err(|_| CommandError::InvalidArgument("string UTF-8 inválida".into())),
            _ => Err(CommandError::InvalidArgument(
                "esperado string ou bulk".into(),
            )),
        }
    }

    /// Próximo argumento como nome de chave. Chave vazia é rejeitada.
    pub fn next_key(&mut self) -> Result<String, CommandError> {
        let key = self.next_string()?;
        if key.is_empty() {
            return Err(CommandError::InvalidArgument("chave vazia".into()));
        }
        Ok(key)
    }

    /// Próximo argumento como bytes crus.
    pub fn next_bytes(&mut self) -> Result<Bytes, CommandError> {
        match self.next()? {
            Frame::Bulk(data) => Ok(data),
            Frame::Simple(s) => Ok(Bytes::from(s)),
            _ => Err(CommandError::InvalidArgument("esperado bulk".into())),
        }
    }

    pub fn next_int(&mut self) -> Result<i64, CommandError> {
        let not_int = |s: &str| CommandError::InvalidArgument(format!("'{s}' não é um inteiro"));

        match self.next()? {
            Frame::Integer(n) => Ok(n),
            Frame::Bulk(data) => {
                let s = std::str::from_utf8(&data)
                    .map_err(|_| CommandError::InvalidArgument("inteiro inválido".into()))?;
                s.parse::<i64>().map_err(|_| not_int(s))
            }
            Frame::Simple(s) => s.parse::<i64>().map_err(|_| not_int(&s)),
            _ => Err(CommandError::InvalidArgument("esperado inteiro".into())),
        }
    }

    /// Consome todos os argumentos restantes como chaves. Exige ao menos uma.
    pub fn rest_keys(&mut self) -> Result<Vec<String>, CommandError> {
        if !self.has_remaining() {
            return Err(self.arity());
        }
        let mut out = Vec::with_capacity(self.parts.len());
        while self.has_remaining() {
            out.push(self.next_key()?);
        }
        Ok(out)
    }

    pub fn has_remaining(&self) -> bool {
        self.parts.len() > 0
    }

    /// Falha se sobrou argumento.
    pub fn finish(&self) -> Result<(), CommandError> {
        if self.has_remaining() {
            Err(self.arity())
        } else {
            Ok(())
        }
    }

    fn next(&mut self) -> Result<Frame, CommandError> {
        self.parts.next().ok_or_else(|| self.arity())
    }

    fn arity(&self) -> CommandError {
        CommandError::WrongArity(self.name.clone())
    }
}
