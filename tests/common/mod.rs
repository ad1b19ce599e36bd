//! Shared fixtures: a hand-built single-record MaxMind database and a
//! tiny canned HTTP server for download tests.

use std::io::{BufRead, BufReader, Write};
use std::net::{Ipv4Addr, TcpListener};
use std::thread;

use flate2::write::GzEncoder;
use flate2::Compression;
use md5::{Digest, Md5};

const NODE_COUNT: u32 = 32;

/// Build a minimal, valid IPv4 MaxMind database mapping exactly `ip` to
/// `{"country": {"iso_code": country}}`. Every other address resolves to
/// "address not found".
///
/// Layout: a 32-node search tree (record size 24, one node per address
/// bit), the 16-byte data-section separator, one data record, and the
/// metadata section.
pub fn tiny_db(ip: Ipv4Addr, country: &str) -> Vec<u8> {
    assert_eq!(country.len(), 2, "iso codes are two characters");
    let addr = u32::from(ip);
    let miss = NODE_COUNT;
    let data_ptr = NODE_COUNT + 16; // offset 0 into the data section

    let mut buf = Vec::new();

    // Search tree: node i consumes bit i (MSB first); the matching branch
    // leads to node i+1, the other to the no-data marker.
    for i in 0..NODE_COUNT {
        let bit = (addr >> (31 - i)) & 1;
        let next = if i == 31 { data_ptr } else { i + 1 };
        let (left, right) = if bit == 0 { (next, miss) } else { (miss, next) };
        buf.extend_from_slice(&left.to_be_bytes()[1..]);
        buf.extend_from_slice(&right.to_be_bytes()[1..]);
    }

    // Data section separator.
    buf.extend_from_slice(&[0u8; 16]);

    // {"country": {"iso_code": country}}
    buf.push(0xE1);
    push_str(&mut buf, "country");
    buf.push(0xE1);
    push_str(&mut buf, "iso_code");
    push_str(&mut buf, country);

    // Metadata section.
    buf.extend_from_slice(b"\xab\xcd\xefMaxMind.com");
    buf.push(0xE9); // map, 9 entries
    push_str(&mut buf, "binary_format_major_version");
    buf.extend_from_slice(&[0xA1, 0x02]); // uint16: 2
    push_str(&mut buf, "binary_format_minor_version");
    buf.push(0xA0); // uint16: 0
    push_str(&mut buf, "build_epoch");
    buf.extend_from_slice(&[0x00, 0x02]); // uint64: 0
    push_str(&mut buf, "database_type");
    push_str(&mut buf, "ipgeo-test");
    push_str(&mut buf, "description");
    buf.push(0xE1);
    push_str(&mut buf, "en");
    push_str(&mut buf, "test database");
    push_str(&mut buf, "ip_version");
    buf.extend_from_slice(&[0xA1, 0x04]); // uint16: 4
    push_str(&mut buf, "languages");
    buf.extend_from_slice(&[0x01, 0x04]); // array, 1 element
    push_str(&mut buf, "en");
    push_str(&mut buf, "node_count");
    buf.extend_from_slice(&[0xC1, NODE_COUNT as u8]); // uint32
    push_str(&mut buf, "record_size");
    buf.extend_from_slice(&[0xA1, 0x18]); // uint16: 24

    buf
}

fn push_str(buf: &mut Vec<u8>, s: &str) {
    assert!(s.len() < 29);
    buf.push(0x40 | s.len() as u8);
    buf.extend_from_slice(s.as_bytes());
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn md5_hex(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Serve `body` over HTTP on a loopback port. Answers HEAD and GET with a
/// digest header, one connection per request, until the process exits.
/// Returns the base URL.
pub fn serve_db(body: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let digest = md5_hex(&body);
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { break };
            let mut reader = BufReader::new(stream);
            let mut request_line = String::new();
            if reader.read_line(&mut request_line).is_err() {
                continue;
            }
            loop {
                let mut line = String::new();
                match reader.read_line(&mut line) {
                    Ok(0) => break,
                    Ok(_) if line.trim_end().is_empty() => break,
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
            let mut stream = reader.into_inner();
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nX-Database-MD5: {}\r\nConnection: close\r\n\r\n",
                body.len(),
                digest
            );
            let _ = stream.write_all(head.as_bytes());
            if !request_line.starts_with("HEAD") {
                let _ = stream.write_all(&body);
            }
        }
    });
    format!("http://{}/db.mmdb.gz", addr)
}
