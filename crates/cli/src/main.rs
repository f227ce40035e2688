use std::io::{self, Write};

use anyhow::{Context, bail};
use bytes::{Buf, BytesMut};
use clap::Parser;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use tidekv_common::{DEFAULT_HOST, DEFAULT_PORT, INITIAL_BUFFER_CAPACITY};
use tidekv_protocol::Frame;

#[derive(Parser, Debug)]
#[command(name = "tidekv-cli", about = "Cliente de linha de comando do TideKV")]
struct Args {
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,
    #[arg(long, short, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Comando para executar diretamente (modo não interativo)
    #[arg(trailing_var_arg = true)]
    command: Vec<String>,
}

/// Conexão do cliente. Bytes que sobram depois de uma resposta ficam no buffer.
struct Client {
    stream: TcpStream,
    buffer: BytesMut,
}

impl Client {
    async fn connect(addr: &str) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("não foi possível conectar a {addr}"))?;
        Ok(Self {
            stream,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        })
    }

    async fn request(&mut self, args: &[String]) -> anyhow::Result<Frame> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.stream
            .write_all(&Frame::array_from_strs(&args).to_bytes())
            .await?;

        loop {
            if let Some((frame, used)) = Frame::decode(&self.buffer)? {
                self.buffer.advance(used);
                return Ok(frame);
            }
            if self.stream.read_buf(&mut self.buffer).await? == 0 {
                bail!("servidor fechou a conexão");
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);
    let mut client = Client::connect(&addr).await?;

    // Modo comando único
    if !args.command.is_empty() {
        let reply = client.request(&args.command).await?;
        println!("{}", format_frame(&reply, 0));
        return Ok(());
    }

    println!("Conectado a {addr}");

    let stdin = io::stdin();
    let mut input = String::new();

    loop {
        print!("tidekv> ");
        io::stdout().flush()?;

        input.clear();
        if stdin.read_line(&mut input)? == 0 {
            break; // EOF
        }

        let line = input.trim();
        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            break;
        }

        let tokens = tokenize(line);
        if tokens.is_empty() {
            continue;
        }

        match client.request(&tokens).await {
            Ok(reply) => println!("{}", format_frame(&reply, 0)),
            Err(e) => {
                println!("(error) {e}");
                break;
            }
        }
    }

    Ok(())
}

/// Divide a linha em argumentos. Aspas simples ou duplas agrupam espaços;
/// dentro delas `\n`, `\t`, `\\` e aspas escapadas são reconhecidos.
fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) if c == '\\' => {
                let escaped = match chars.peek() {
                    Some('n') => Some('\n'),
                    Some('t') => Some('\t'),
                    Some(&ch) if matches!(ch, '\\' | '"' | '\'') => Some(ch),
                    _ => None,
                };
                match escaped {
                    Some(ch) => {
                        current.push(ch);
                        chars.next();
                    }
                    None => current.push(c),
                }
            }
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            None => current.push(c),
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

/// Formata uma resposta para leitura humana.
///
/// `indent` é a coluna onde começam as linhas seguintes à primeira, para que
/// arrays aninhados fiquem alinhados sob o índice do item pai.
fn format_frame(frame: &Frame, indent: usize) -> String {
    match frame {
        Frame::Simple(s) => s.clone(),
        Frame::Error(s) => format!("(error) {s}"),
        Frame::Integer(n) => format!("(integer) {n}"),
        Frame::Bulk(data) => match std::str::from_utf8(data) {
            Ok(s) => format!("\"{s}\""),
            Err(_) => format!("(binary) {} bytes", data.len()),
        },
        Frame::Null => "(nil)".to_string(),
        Frame::Array(frames) if frames.is_empty() => "(empty list)".to_string(),
        Frame::Array(frames) => {
            let pad = " ".repeat(indent);
            frames
                .iter()
                .enumerate()
                .map(|(i, f)| {
                    let label = format!("{}) ", i + 1);
                    let body = format_frame(f, indent + label.len());
                    if i == 0 {
                        format!("{label}{body}")
                    } else {
                        format!("{pad}{label}{body}")
                    }
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
    }
}
