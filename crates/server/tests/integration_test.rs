use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::Duration;

use tidekv_protocol::Frame;
use tidekv_server::{Connection, handle_connection};
use tidekv_storage::Db;

/// Helper: envia um comando e lê o frame de resposta.
async fn send_command(stream: &mut TcpStream, args: &[&str]) -> Frame {
    stream
        .write_all(&Frame::array_from_strs(args).to_bytes())
        .await
        .unwrap();
    read_reply(stream).await
}

async fn read_reply(stream: &mut TcpStream) -> Frame {
    let mut buf = BytesMut::with_capacity(4096);
    loop {
        if let Some((frame, _)) = Frame::decode(&buf).unwrap() {
            return frame;
        }
        let n = stream.read_buf(&mut buf).await.unwrap();
        assert!(n > 0, "servidor fechou a conexão inesperadamente");
    }
}

/// Sobe um servidor numa porta livre e devolve a conexão de um cliente.
async fn connect(db: Db) -> (TcpStream, broadcast::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let accept_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let db = db.clone();
            let mut shutdown_rx = accept_tx.subscribe();
            tokio::spawn(async move {
                let _ = handle_connection(Connection::new(socket), db, &mut shutdown_rx).await;
            });
        }
    });

    let stream = TcpStream::connect(addr).await.unwrap();
    (stream, shutdown_tx)
}

#[tokio::test]
async fn test_ping_pong() {
    let (mut stream, _shutdown) = connect(Db::new()).await;

    assert_eq!(send_command(&mut stream, &["PING"]).await, Frame::Simple("PONG".into()));
    assert_eq!(
        send_command(&mut stream, &["PING", "hello"]).await,
        Frame::Bulk(Bytes::from("hello"))
    );
    assert_eq!(
        send_command(&mut stream, &["ECHO", "Hello, TideKV!"]).await,
        Frame::Bulk(Bytes::from("Hello, TideKV!"))
    );
}

#[tokio::test]
async fn test_set_get_update() {
    let (mut stream, _shutdown) = connect(Db::new()).await;

    assert_eq!(send_command(&mut stream, &["GET", "mykey"]).await, Frame::Null);
    assert_eq!(send_command(&mut stream, &["SET", "mykey", "myvalue"]).await, Frame::ok());
    assert_eq!(
        send_command(&mut stream, &["GET", "mykey"]).await,
        Frame::Bulk(Bytes::from("myvalue"))
    );

    assert_eq!(send_command(&mut stream, &["UPDATE", "mykey", "other"]).await, Frame::ok());
    assert_eq!(
        send_command(&mut stream, &["GET", "mykey"]).await,
        Frame::Bulk(Bytes::from("other"))
    );
    assert_eq!(
        send_command(&mut stream, &["UPDATE", "nope", "x"]).await,
        Frame::Error("ERR no such key".into())
    );
}

#[tokio::test]
async fn test_list_operations() {
    let (mut stream, _shutdown) = connect(Db::new()).await;

    assert_eq!(send_command(&mut stream, &["RPUSH", "list", "a"]).await, Frame::Integer(1));
    assert_eq!(send_command(&mut stream, &["RPUSH", "list", "b"]).await, Frame::Integer(2));
    assert_eq!(send_command(&mut stream, &["LPUSH", "list", "z"]).await, Frame::Integer(3));

    assert_eq!(
        send_command(&mut stream, &["LRANGE", "list", "-100", "100"]).await,
        Frame::Array(vec![
            Frame::Bulk(Bytes::from("z")),
            Frame::Bulk(Bytes::from("a")),
            Frame::Bulk(Bytes::from("b")),
        ])
    );
    assert_eq!(
        send_command(&mut stream, &["LRANGE", "list", "5", "2"]).await,
        Frame::Array(vec![])
    );

    assert_eq!(
        send_command(&mut stream, &["LPOP", "list"]).await,
        Frame::Bulk(Bytes::from("z"))
    );
    assert_eq!(
        send_command(&mut stream, &["RPOP", "list"]).await,
        Frame::Bulk(Bytes::from("b"))
    );
    assert_eq!(send_command(&mut stream, &["LLEN", "list"]).await, Frame::Integer(1));
}

#[tokio::test]
async fn test_wrongtype() {
    let (mut stream, _shutdown) = connect(Db::new()).await;

    send_command(&mut stream, &["SET", "k", "x"]).await;
    match send_command(&mut stream, &["RPUSH", "k", "y"]).await {
        Frame::Error(msg) => assert!(msg.starts_with("WRONGTYPE")),
        other => panic!("esperado erro, veio {other:?}"),
    }
    assert_eq!(
        send_command(&mut stream, &["GET", "k"]).await,
        Frame::Bulk(Bytes::from("x"))
    );
}

#[tokio::test]
async fn test_set_with_px_expires() {
    let (mut stream, _shutdown) = connect(Db::new()).await;

    assert_eq!(
        send_command(&mut stream, &["SET", "temp", "val", "PX", "100"]).await,
        Frame::ok()
    );
    assert_eq!(
        send_command(&mut stream, &["GET", "temp"]).await,
        Frame::Bulk(Bytes::from("val"))
    );

    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(send_command(&mut stream, &["GET", "temp"]).await, Frame::Null);
    assert_eq!(send_command(&mut stream, &["EXISTS", "temp"]).await, Frame::Integer(0));
}

#[tokio::test]
async fn test_set_rejects_non_positive_ex() {
    let (mut stream, _shutdown) = connect(Db::new()).await;

    match send_command(&mut stream, &["SET", "k", "v", "EX", "0"]).await {
        Frame::Error(msg) => assert!(msg.starts_with("ERR")),
        other => panic!("esperado erro, veio {other:?}"),
    }
    assert_eq!(send_command(&mut stream, &["EXISTS", "k"]).await, Frame::Integer(0));
}

#[tokio::test]
async fn test_ttl_commands() {
    let (mut stream, _shutdown) = connect(Db::new()).await;

    assert_eq!(send_command(&mut stream, &["TTL", "k"]).await, Frame::Null);
    send_command(&mut stream, &["SET", "k", "v"]).await;
    assert_eq!(send_command(&mut stream, &["TTL", "k"]).await, Frame::Integer(-1));

    assert_eq!(send_command(&mut stream, &["EXPIRE", "k", "100"]).await, Frame::ok());
    match send_command(&mut stream, &["TTL", "k"]).await {
        Frame::Integer(secs) => assert!((90..=100).contains(&secs)),
        other => panic!("esperado inteiro, veio {other:?}"),
    }

    assert_eq!(send_command(&mut stream, &["PERSIST", "k"]).await, Frame::ok());
    assert_eq!(send_command(&mut stream, &["PTTL", "k"]).await, Frame::Integer(-1));

    assert_eq!(send_command(&mut stream, &["PEXPIRE", "k", "50"]).await, Frame::ok());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(send_command(&mut stream, &["PTTL", "k"]).await, Frame::Null);
}

#[tokio::test]
async fn test_del_exists_type() {
    let (mut stream, _shutdown) = connect(Db::new()).await;

    send_command(&mut stream, &["SET", "a", "1"]).await;
    send_command(&mut stream, &["RPUSH", "b", "2"]).await;

    assert_eq!(
        send_command(&mut stream, &["EXISTS", "a", "b", "c"]).await,
        Frame::Integer(2)
    );
    assert_eq!(send_command(&mut stream, &["TYPE", "a"]).await, Frame::Simple("string".into()));
    assert_eq!(send_command(&mut stream, &["TYPE", "b"]).await, Frame::Simple("list".into()));
    assert_eq!(send_command(&mut stream, &["TYPE", "c"]).await, Frame::Simple("none".into()));

    assert_eq!(send_command(&mut stream, &["DEL", "a", "c"]).await, Frame::Integer(1));
    assert_eq!(send_command(&mut stream, &["EXISTS", "a"]).await, Frame::Integer(0));
}

#[tokio::test]
async fn test_flushdb_and_dbsize() {
    let (mut stream, _shutdown) = connect(Db::new()).await;

    assert_eq!(send_command(&mut stream, &["FLUSHDB"]).await, Frame::ok());
    send_command(&mut stream, &["SET", "a", "1"]).await;
    send_command(&mut stream, &["SET", "b", "2"]).await;
    assert_eq!(send_command(&mut stream, &["DBSIZE"]).await, Frame::Integer(2));

    assert_eq!(send_command(&mut stream, &["FLUSHDB"]).await, Frame::ok());
    assert_eq!(send_command(&mut stream, &["DBSIZE"]).await, Frame::Integer(0));
}

#[tokio::test]
async fn test_unknown_command_and_wrong_arity() {
    let (mut stream, _shutdown) = connect(Db::new()).await;

    match send_command(&mut stream, &["FOOBAR"]).await {
        Frame::Error(msg) => assert!(msg.contains("unknown command")),
        other => panic!("esperado erro, veio {other:?}"),
    }
    match send_command(&mut stream, &["GET"]).await {
        Frame::Error(msg) => assert!(msg.starts_with("ERR")),
        other => panic!("esperado erro, veio {other:?}"),
    }

    // A conexão continua utilizável depois de um erro
    assert_eq!(send_command(&mut stream, &["PING"]).await, Frame::Simple("PONG".into()));
}

#[tokio::test]
async fn test_pipelined_commands() {
    let (mut stream, _shutdown) = connect(Db::new()).await;

    let commands: [&[&str]; 3] = [&["SET", "p", "1"], &["GET", "p"], &["DBSIZE"]];
    let mut batch = BytesMut::new();
    for args in commands {
        Frame::array_from_strs(args).encode(&mut batch);
    }
    stream.write_all(&batch).await.unwrap();

    let mut buf = BytesMut::new();
    let mut replies = Vec::new();
    while replies.len() < 3 {
        while let Some((frame, used)) = Frame::decode(&buf).unwrap() {
            replies.push(frame);
            let _ = buf.split_to(used);
        }
        if replies.len() < 3 {
            assert!(stream.read_buf(&mut buf).await.unwrap() > 0);
        }
    }

    assert_eq!(
        replies,
        vec![Frame::ok(), Frame::Bulk(Bytes::from("1")), Frame::Integer(1)]
    );
}

#[tokio::test]
async fn test_clients_share_one_store() {
    let db = Db::new();
    let (mut first, _shutdown) = connect(db.clone()).await;
    let (mut second, _shutdown2) = connect(db.clone()).await;

    send_command(&mut first, &["SET", "shared", "yes"]).await;
    assert_eq!(
        send_command(&mut second, &["GET", "shared"]).await,
        Frame::Bulk(Bytes::from("yes"))
    );
    assert!(db.exists("shared"));
}

#[tokio::test]
async fn test_shutdown_closes_connection() {
    let (mut stream, shutdown) = connect(Db::new()).await;
    assert_eq!(send_command(&mut stream, &["PING"]).await, Frame::Simple("PONG".into()));

    shutdown.send(()).unwrap();

    let mut buf = [0u8; 16];
    let n = tokio::time::timeout(Duration::from_secs(1), stream.read(&mut buf))
        .await
        .expect("conexão deveria fechar")
        .unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_reaper_sweeps_idle_keys() {
    let db = Db::new();
    let mut reaper = db.start_reaper(Duration::from_millis(10));
    let (mut stream, _shutdown) = connect(db.clone()).await;

    send_command(&mut stream, &["SET", "idle", "v", "PX", "1"]).await;
    tokio::time::sleep(Duration::from_millis(60)).await;

    // Ninguém leu a chave: se não há o que purgar, o reaper já a removeu
    assert_eq!(db.purge_expired(), 0);
    reaper.stop().await;
}

#[tokio::test]
async fn test_deeply_nested_frame_rejected_and_server_survives() {
    let db = Db::new();
    let (mut stream, _shutdown) = connect(db.clone()).await;

    stream
        .write_all("*1\r\n".repeat(100).as_bytes())
        .await
        .unwrap();
    match read_reply(&mut stream).await {
        Frame::Error(msg) => assert!(msg.starts_with("ERR")),
        other => panic!("esperado erro, veio {other:?}"),
    }

    // Outro cliente continua sendo atendido
    let (mut other, _shutdown2) = connect(db).await;
    assert_eq!(send_command(&mut other, &["PING"]).await, Frame::Simple("PONG".into()));
}
