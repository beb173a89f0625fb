#![allow(dead_code)]

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

use ttft_core::{RequestBudget, SweepProfile};

/// Local `/generate_stream` server answering every request with a short chunked body.
///
/// Runs until the test process exits; returns the `host:port` target.
pub fn spawn_stream_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind stream server");
    let address = listener.local_addr().expect("local addr").to_string();
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            thread::spawn(move || serve_connection(stream));
        }
    });
    address
}

fn serve_connection(stream: TcpStream) {
    let Ok(read_half) = stream.try_clone() else {
        return;
    };
    let mut reader = BufReader::new(read_half);
    let mut writer = stream;

    // Keep-alive: answer requests until the client hangs up.
    loop {
        let mut content_length = 0usize;
        let mut saw_request_line = false;
        loop {
            let mut line = String::new();
            match reader.read_line(&mut line) {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            }
            if line == "\r\n" {
                break;
            }
            saw_request_line = true;
            if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
        if !saw_request_line {
            return;
        }
        let mut body = vec![0u8; content_length];
        if reader.read_exact(&mut body).is_err() {
            return;
        }

        let response = "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
                        5\r\nHello\r\n6\r\n world\r\n0\r\n\r\n";
        if writer.write_all(response.as_bytes()).is_err() || writer.flush().is_err() {
            return;
        }
    }
}

pub fn profile(name: &str, max_inflight: Vec<u32>, concurrency: Vec<u32>) -> SweepProfile {
    SweepProfile {
        name: name.to_string(),
        max_inflight,
        concurrency,
        request_budget: RequestBudget::PerClient(2),
        prompt: "Hello world".to_string(),
        max_output_tokens: 8,
        cooldown_ms: 0,
        run_timeout_secs: None,
    }
}
