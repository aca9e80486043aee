//! Integration tests for the line channel and stderr capture.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use tfvc_annotate::protocol::channel::{ErrorStream, LineChannel};

/// Lines written through the channel reach the tool with `\r\n`, and queued
/// lines only leave on flush.
#[tokio::test]
async fn writes_are_crlf_terminated_and_flushed_together() {
    let (driver_stdout, _tool_stdout) = tokio::io::duplex(1024);
    let (mut tool_stdin, driver_stdin) = tokio::io::duplex(1024);
    let mut channel = LineChannel::new(driver_stdout, driver_stdin);

    channel.queue_line("alice").await.expect("queue");
    channel.queue_line("").await.expect("queue");
    channel.flush().await.expect("flush");
    channel.write_line("src/A.cs").await.expect("write");
    channel.close().await.expect("close");

    let mut received = String::new();
    tool_stdin
        .read_to_string(&mut received)
        .await
        .expect("read tool stdin");
    assert_eq!(received, "alice\r\n\r\nsrc/A.cs\r\n");
}

/// Reads return lines in order and `None` once the tool closes stdout.
#[tokio::test]
async fn reads_end_with_none_at_eof() {
    let (driver_stdout, mut tool_stdout) = tokio::io::duplex(1024);
    let (_tool_stdin, driver_stdin) = tokio::io::duplex(1024);
    let mut channel = LineChannel::new(driver_stdout, driver_stdin);

    tool_stdout
        .write_all(b"first\r\nsecond\nlast")
        .await
        .expect("write");
    drop(tool_stdout);

    assert_eq!(channel.read_line().await.expect("read").as_deref(), Some("first"));
    assert_eq!(channel.read_line().await.expect("read").as_deref(), Some("second"));
    assert_eq!(channel.read_line().await.expect("read").as_deref(), Some("last"));
    assert_eq!(channel.read_line().await.expect("read"), None);
}

/// Stderr lines are available one at a time, as a drained batch, and as the
/// remainder at teardown.
#[tokio::test]
async fn error_stream_delivers_lines() {
    let (driver_stderr, mut tool_stderr) = tokio::io::duplex(1024);
    let mut errors = ErrorStream::spawn(driver_stderr);

    tool_stderr.write_all(b"first\n").await.expect("write");
    assert_eq!(errors.next_line().await.as_deref(), Some("first"));

    tool_stderr.write_all(b"second\nthird\n").await.expect("write");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(errors.drain(), vec!["second".to_owned(), "third".to_owned()]);
    assert!(errors.drain().is_empty());

    tool_stderr.write_all(b"fourth\n").await.expect("write");
    drop(tool_stderr);
    assert_eq!(errors.finish().await, vec!["fourth".to_owned()]);
}
