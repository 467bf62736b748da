// sentinel-scan/src/collectors/network.rs
// Active connections from `netstat -ano`

use super::command::{run_command, CommandError};
use super::windows_only;
use sentinel_core::{Collector, Module, RawFinding, Result};
use std::collections::{HashMap, HashSet};
use sysinfo::System;

const MAX_FINDINGS: usize = 100;

const SUSPICIOUS_PORTS: &[(u16, &str)] = &[
    (4444, "Metasploit default"),
    (5555, "Android Debug Bridge (potential backdoor)"),
    (6666, "IRC backdoor"),
    (6667, "IRC backdoor"),
    (1337, "Common backdoor port"),
    (31337, "Back Orifice"),
    (12345, "NetBus"),
    (27374, "SubSeven"),
    (20, "FTP Data (unusual if outbound)"),
    (23, "Telnet (insecure)"),
    (445, "SMB (potential lateral movement)"),
    (3389, "RDP (check if expected)"),
    (5900, "VNC"),
    (8080, "HTTP Proxy (potential C2)"),
    (9001, "Tor default"),
    (9050, "Tor SOCKS"),
];

const KNOWN_SYSTEM_PROCESSES: &[&str] = &[
    "system",
    "svchost.exe",
    "services.exe",
    "lsass.exe",
    "wininit.exe",
    "csrss.exe",
    "smss.exe",
    "explorer.exe",
    "searchindexer.exe",
    "spoolsv.exe",
    "taskhost.exe",
];

const INTERNAL_PREFIXES: &[&str] = &["127.", "192.168.", "10.", "172."];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub ip: String,
    pub port: u16,
}

impl Endpoint {
    fn display(endpoint: Option<&Endpoint>) -> String {
        match endpoint {
            Some(e) => format!("{}:{}", e.ip, e.port),
            None => "N/A".to_string(),
        }
    }
}

/// One netstat row. States use the `ESTABLISHED`/`LISTEN`/`NONE` vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub local: Option<Endpoint>,
    pub remote: Option<Endpoint>,
    pub state: String,
    pub pid: u32,
}

pub struct NetworkCollector;

impl Collector for NetworkCollector {
    fn module(&self) -> &str {
        Module::Network.as_str()
    }

    fn collect(&self) -> Result<Vec<RawFinding>> {
        if !windows_only(self.module()) {
            return Ok(Vec::new());
        }

        let output = match run_command("netstat", &["-ano"]) {
            Ok(output) => output,
            Err(CommandError::AccessDenied { .. }) => return Ok(vec![access_denied_finding()]),
            Err(e) => return Err(e.into_sentinel(self.module())),
        };

        let sys = System::new_all();
        let processes: HashMap<u32, (String, String)> = sys
            .processes()
            .iter()
            .map(|(pid, process)| {
                let path = process
                    .exe()
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_default();
                (pid.as_u32(), (process.name().to_string(), path))
            })
            .collect();

        Ok(connection_findings(parse_netstat(&output), |pid| {
            if pid == 0 {
                return ("Unknown".to_string(), String::new());
            }
            processes
                .get(&pid)
                .cloned()
                .unwrap_or_else(|| (format!("PID:{}", pid), String::new()))
        }))
    }
}

pub fn access_denied_finding() -> RawFinding {
    RawFinding::new(Module::Network.as_str(), "Network Scan", "Access Denied - Run as Administrator")
}

fn parse_endpoint(text: &str) -> Option<Endpoint> {
    let (host, port) = text.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    let ip = host.trim_start_matches('[').trim_end_matches(']');
    if port == 0 || ip == "*" {
        return None;
    }
    Some(Endpoint {
        ip: ip.to_string(),
        port,
    })
}

/// Parses `netstat -ano` rows; header and banner lines are ignored.
pub fn parse_netstat(text: &str) -> Vec<Connection> {
    text.lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            match fields.as_slice() {
                [proto, local, remote, state, pid] if proto.eq_ignore_ascii_case("tcp") => Some(Connection {
                    local: parse_endpoint(local),
                    remote: parse_endpoint(remote),
                    state: match *state {
                        "LISTENING" => "LISTEN".to_string(),
                        other => other.to_string(),
                    },
                    pid: pid.parse().ok()?,
                }),
                [proto, local, remote, pid] if proto.eq_ignore_ascii_case("udp") => Some(Connection {
                    local: parse_endpoint(local),
                    remote: parse_endpoint(remote),
                    state: "NONE".to_string(),
                    pid: pid.parse().ok()?,
                }),
                _ => None,
            }
        })
        .collect()
}

fn suspicious_port(port: u16) -> Option<&'static str> {
    SUSPICIOUS_PORTS
        .iter()
        .find(|(candidate, _)| *candidate == port)
        .map(|(_, description)| *description)
}

/// Risk score and reasons for one connection owned by `process_name`.
pub fn score_connection(conn: &Connection, process_name: &str) -> (u32, Vec<String>) {
    let is_system = KNOWN_SYSTEM_PROCESSES.contains(&process_name.to_lowercase().as_str());
    let mut risk = 0;
    let mut reasons = Vec::new();

    if let Some(description) = conn.remote.as_ref().and_then(|r| suspicious_port(r.port)) {
        risk += 40;
        reasons.push(format!("Suspicious port: {}", description));
    }

    if let Some(remote) = &conn.remote {
        if conn.state == "ESTABLISHED"
            && !is_system
            && !INTERNAL_PREFIXES.iter().any(|prefix| remote.ip.starts_with(prefix))
        {
            risk += 20;
            reasons.push("External connection".to_string());
        }
    }

    if conn.state == "LISTEN" {
        let local_port = conn.local.as_ref().map(|l| l.port).unwrap_or(0);
        if local_port < 1024 && !is_system {
            risk += 30;
            reasons.push("Non-system process listening on privileged port".to_string());
        } else if suspicious_port(local_port).is_some() {
            risk += 50;
            reasons.push("Listening on suspicious port".to_string());
        }
    }

    (risk, reasons)
}

/// De-duplicates, scores and ranks connections; `resolve` maps a PID to
/// the owning process name and executable path.
pub fn connection_findings<F>(connections: Vec<Connection>, resolve: F) -> Vec<RawFinding>
where
    F: Fn(u32) -> (String, String),
{
    let mut seen = HashSet::new();
    let mut findings = Vec::new();

    for conn in connections {
        let (name, path) = resolve(conn.pid);
        let local = Endpoint::display(conn.local.as_ref());
        let remote = Endpoint::display(conn.remote.as_ref());
        if !seen.insert((name.clone(), local.clone(), remote.clone(), conn.state.clone())) {
            continue;
        }

        let (risk, reasons) = score_connection(&conn, &name);
        let mut status = format!("{} | Local: {} → Remote: {}", conn.state, local, remote);
        if !reasons.is_empty() {
            status.push_str(&format!(" | ⚠️ {}", reasons.join(", ")));
        }
        findings.push(
            RawFinding::new(Module::Network.as_str(), name, status)
                .with_path(path)
                .with_risk_score(risk),
        );
    }

    findings.sort_by(|a, b| b.risk_score.cmp(&a.risk_score));
    findings.truncate(MAX_FINDINGS);
    findings
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "
Active Connections

  Proto  Local Address          Foreign Address        State           PID
  TCP    0.0.0.0:135            0.0.0.0:0              LISTENING       1024
  TCP    0.0.0.0:4444           0.0.0.0:0              LISTENING       6600
  TCP    10.0.0.5:50123         203.0.113.9:4444       ESTABLISHED     6600
  TCP    10.0.0.5:50124         203.0.113.9:4444       ESTABLISHED     6600
  TCP    [::]:135               [::]:0                 LISTENING       4
  UDP    0.0.0.0:5353           *:*                                    2200
";

    fn resolve(pid: u32) -> (String, String) {
        match pid {
            1024 => ("svchost.exe".to_string(), r"C:\Windows\System32\svchost.exe".to_string()),
            4 => ("System".to_string(), String::new()),
            6600 => ("payload.exe".to_string(), r"C:\Users\Public\payload.exe".to_string()),
            other => (format!("PID:{}", other), String::new()),
        }
    }

    #[test]
    fn test_parse_netstat() {
        let connections = parse_netstat(SAMPLE);
        assert_eq!(connections.len(), 6);
        assert_eq!(connections[0].state, "LISTEN");
        assert_eq!(connections[0].remote, None);
        assert_eq!(
            connections[2].remote,
            Some(Endpoint {
                ip: "203.0.113.9".to_string(),
                port: 4444
            })
        );
        assert_eq!(connections[4].local.as_ref().map(|l| l.ip.as_str()), Some("::"));
        assert_eq!(connections[5].state, "NONE");
        assert_eq!(connections[5].remote, None);
    }

    #[test]
    fn test_scoring_and_ranking() {
        let findings = connection_findings(parse_netstat(SAMPLE), resolve);

        // the duplicate ESTABLISHED row collapses
        assert_eq!(findings.len(), 5);

        let top = &findings[0];
        assert_eq!(top.name, "payload.exe");
        assert_eq!(top.risk_score, 60);
        assert_eq!(
            top.status,
            "ESTABLISHED | Local: 10.0.0.5:50123 → Remote: 203.0.113.9:4444 | ⚠️ Suspicious port: Metasploit default, External connection"
        );

        let listener = findings.iter().find(|f| f.status.contains("0.0.0.0:4444")).unwrap();
        assert_eq!(listener.risk_score, 50);

        let system = findings.iter().find(|f| f.name == "System").unwrap();
        assert_eq!(system.risk_score, 0);
        assert_eq!(system.status, "LISTEN | Local: :::135 → Remote: N/A");
    }

    #[test]
    fn test_internal_remote_is_not_external() {
        let conn = Connection {
            local: parse_endpoint("192.168.1.2:50000"),
            remote: parse_endpoint("192.168.1.1:443"),
            state: "ESTABLISHED".to_string(),
            pid: 10,
        };
        assert_eq!(score_connection(&conn, "chrome.exe"), (0, Vec::new()));
    }

    #[test]
    fn test_access_denied_finding() {
        let finding = access_denied_finding();
        assert_eq!(finding.name, "Network Scan");
        assert_eq!(finding.risk_score, 0);
    }
}
