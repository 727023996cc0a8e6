use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;
use wkrpc::RpcError;
use wkrpc::config::{Cli, Config, FileConfig};
use wkrpc::connection::connect;
use wkrpc::driver::Driver;
use wkrpc::protocol::{Command, read_message, write_message};
use wkrpc::server::serve;

async fn spawn_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(serve(listener, 1));
    port
}

fn config(server: &str, port: u16, args: &[&str]) -> Config {
    let port = port.to_string();
    let mut argv = vec!["wkrpc", "--server", server, "--port", port.as_str()];
    argv.extend_from_slice(args);
    let mut config =
        Config::resolve(Cli::try_parse_from(argv).unwrap(), FileConfig::default()).unwrap();
    config.calibration_file = None;
    config
}

fn scratch(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("wkrpc-e2e-{}-{}", std::process::id(), name));
    let _ = std::fs::remove_file(&path);
    path
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ping_run_gets_every_response_in_order() {
    let port = spawn_server().await;
    let config = config("127.0.0.1", port, &["--command", "ping", "--repeat", "5"]);

    let mut conn = connect(&config.server, config.port).await.unwrap();
    let report = Driver::new(&mut conn, &config, 1).run().await.unwrap();
    conn.close().await.unwrap();

    assert_eq!(report.responses.len(), 5);
    assert_eq!(report.failed, 0);
    for (i, response) in report.responses.iter().enumerate() {
        assert_eq!(response.command, Command::Ping);
        assert_eq!(response.remaining, 5 - i as i32);
        assert_eq!(response.status, 0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn output_file_holds_repeat_minus_one_deltas() {
    let port = spawn_server().await;
    let output = scratch("stats");
    let output_arg = output.to_string_lossy().into_owned();
    let config = config(
        "127.0.0.1",
        port,
        &[
            "--command",
            "sleep",
            "--delay",
            "1",
            "--repeat",
            "6",
            "--poll",
            "10",
            "--output",
            output_arg.as_str(),
        ],
    );

    let mut conn = connect(&config.server, config.port).await.unwrap();
    let report = Driver::new(&mut conn, &config, 1).run().await.unwrap();
    conn.close().await.unwrap();

    assert_eq!(report.samples.save(&config.output).unwrap(), 5);
    let text = std::fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 5);
    for (i, line) in lines.iter().enumerate() {
        let (index, delta) = line.split_once(',').unwrap();
        assert_eq!(index, i.to_string());
        // every gap spans at least the server's 1ms sleep
        assert!(delta.parse::<f64>().unwrap() >= 0.001, "line {}", line);
    }
    std::fs::remove_file(&output).unwrap();
}

#[tokio::test]
async fn unresolvable_server_fails_before_connecting() {
    let config = config("wkrpc-missing.invalid", 9876, &[]);
    assert!(matches!(
        connect(&config.server, config.port).await,
        Err(RpcError::Resolution { .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn polling_keeps_waiting_on_a_silent_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let _request = read_message(&mut socket).await.unwrap();
        // hold the connection open without ever answering
        tokio::time::sleep(Duration::from_secs(30)).await;
        drop(socket);
    });

    let config = config("127.0.0.1", port, &["--command", "ping", "--poll", "5"]);
    let mut conn = connect(&config.server, config.port).await.unwrap();
    let outcome = timeout(
        Duration::from_millis(300),
        Driver::new(&mut conn, &config, 1).run(),
    )
    .await;
    assert!(outcome.is_err(), "run returned before the server answered");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn poll_limit_turns_silence_into_an_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_message(&mut socket).await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        let _ = write_message(&mut socket, &request).await;
    });

    let config = config(
        "127.0.0.1",
        port,
        &["--command", "ping", "--poll", "5", "--poll-limit", "4"],
    );
    let mut conn = connect(&config.server, config.port).await.unwrap();
    match Driver::new(&mut conn, &config, 1).run().await {
        Err(RpcError::PollExhausted { rounds }) => assert_eq!(rounds, 4),
        other => panic!("expected poll exhaustion, got {:?}", other.map(|r| r.failed)),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn poll_limit_applies_after_the_first_response() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let first = read_message(&mut socket).await.unwrap();
        write_message(&mut socket, &first).await.unwrap();
        let second = read_message(&mut socket).await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        let _ = write_message(&mut socket, &second).await;
    });

    let config = config(
        "127.0.0.1",
        port,
        &[
            "--command",
            "ping",
            "--poll",
            "5",
            "--poll-limit",
            "4",
            "--repeat",
            "2",
        ],
    );
    let mut conn = connect(&config.server, config.port).await.unwrap();
    let outcome = timeout(
        Duration::from_secs(2),
        Driver::new(&mut conn, &config, 1).run(),
    )
    .await
    .expect("second iteration blocked in read instead of polling");
    match outcome {
        Err(RpcError::PollExhausted { rounds }) => assert_eq!(rounds, 4),
        other => panic!("expected poll exhaustion, got {:?}", other.map(|r| r.failed)),
    }
}
