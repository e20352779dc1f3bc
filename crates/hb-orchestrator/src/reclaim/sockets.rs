//! Finding the processes that hold a TCP port
//!
//! Linux reads `/proc` directly; macOS asks `lsof`; Windows parses
//! `netstat -ano`. All of it is blocking and runs on the blocking pool.

use std::collections::BTreeSet;
use std::io;

/// A process holding a socket on the queried port
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SocketOwner {
    pub pid: u32,
    pub name: Option<String>,
}

/// Every process with a listening or established TCP socket whose local
/// port is `port`, sorted by pid.
#[cfg(target_os = "linux")]
pub fn port_owners(port: u16) -> io::Result<Vec<SocketOwner>> {
    let mut inodes = BTreeSet::new();
    for table in ["/proc/net/tcp", "/proc/net/tcp6"] {
        match std::fs::read_to_string(table) {
            Ok(content) => inodes.extend(parse_proc_net_tcp(&content, port)),
            // tcp6 is absent when IPv6 is disabled
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    if inodes.is_empty() {
        return Ok(Vec::new());
    }

    let mut owners = BTreeSet::new();
    for entry in std::fs::read_dir("/proc")?.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };
        // Processes we may not inspect, or that exit mid-scan, are skipped
        let Ok(fds) = std::fs::read_dir(entry.path().join("fd")) else {
            continue;
        };
        let holds_socket = fds.flatten().any(|fd| {
            std::fs::read_link(fd.path())
                .ok()
                .and_then(|target| socket_inode(&target.to_string_lossy()))
                .map(|inode| inodes.contains(&inode))
                .unwrap_or(false)
        });
        if holds_socket {
            let name = std::fs::read_to_string(entry.path().join("comm"))
                .ok()
                .map(|s| s.trim().to_string());
            owners.insert(SocketOwner { pid, name });
        }
    }
    Ok(owners.into_iter().collect())
}

#[cfg(target_os = "macos")]
pub fn port_owners(port: u16) -> io::Result<Vec<SocketOwner>> {
    let output = std::process::Command::new("lsof")
        .args(["-nP", "-t", &format!("-iTCP:{}", port), "-sTCP:LISTEN,ESTABLISHED"])
        .output()?;
    // lsof exits 1 when nothing matches
    let pids: BTreeSet<u32> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|l| l.trim().parse().ok())
        .collect();
    Ok(pids
        .into_iter()
        .map(|pid| SocketOwner { pid, name: None })
        .collect())
}

#[cfg(windows)]
pub fn port_owners(port: u16) -> io::Result<Vec<SocketOwner>> {
    let output = std::process::Command::new("netstat")
        .args(["-ano", "-p", "TCP"])
        .output()?;
    let mut pids = parse_netstat(&String::from_utf8_lossy(&output.stdout), port);
    let output = std::process::Command::new("netstat")
        .args(["-ano", "-p", "TCPv6"])
        .output()?;
    pids.extend(parse_netstat(&String::from_utf8_lossy(&output.stdout), port));
    Ok(pids
        .into_iter()
        .map(|pid| SocketOwner { pid, name: None })
        .collect())
}

#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
pub fn port_owners(_port: u16) -> io::Result<Vec<SocketOwner>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "port enumeration is not supported on this platform",
    ))
}

const TCP_ESTABLISHED: &str = "01";
const TCP_LISTEN: &str = "0A";

/// Socket inodes from a `/proc/net/tcp{,6}` table whose local port matches
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
pub(crate) fn parse_proc_net_tcp(content: &str, port: u16) -> BTreeSet<u64> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            // sl local rem st tx:rx tr:when retrnsmt uid timeout inode
            if fields.len() < 10 {
                return None;
            }
            let local_port = fields[1].rsplit(':').next()?;
            let local_port = u16::from_str_radix(local_port, 16).ok()?;
            let state = fields[3];
            if local_port != port || (state != TCP_LISTEN && state != TCP_ESTABLISHED) {
                return None;
            }
            fields[9].parse::<u64>().ok().filter(|&inode| inode != 0)
        })
        .collect()
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn socket_inode(link: &str) -> Option<u64> {
    link.strip_prefix("socket:[")?.strip_suffix(']')?.parse().ok()
}

/// Owning pids from `netstat -ano` output whose local address ends in `:port`
#[cfg_attr(not(windows), allow(dead_code))]
pub(crate) fn parse_netstat(output: &str, port: u16) -> BTreeSet<u32> {
    let suffix = format!(":{}", port);
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            // Proto Local Foreign State PID
            if fields.len() != 5 || !fields[0].eq_ignore_ascii_case("TCP") {
                return None;
            }
            if !fields[1].ends_with(&suffix) {
                return None;
            }
            if fields[3] != "LISTENING" && fields[3] != "ESTABLISHED" {
                return None;
            }
            fields[4].parse::<u32>().ok().filter(|&pid| pid != 0)
        })
        .collect()
}
