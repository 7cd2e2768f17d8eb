/// Configuration file loader.
///
/// Parses a whitespace-separated, `#`-commented directive file: one
/// directive per line, directive name case-insensitive, unknown directives
/// are a hard error.
use std::path::Path;

use crate::error::ConfigError;

/// A `host:port` pair as written in the configuration file. Resolution to a
/// concrete `SocketAddr` happens at transport-construction time, not here,
/// since DNS resolution is an I/O operation the config loader shouldn't own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} @ {}", self.host, self.port)
    }
}

/// The transport variant selected by the configuration, mirroring the
/// original's `connection_type` string plus whichever of
/// `udp_local`/`udp_remote`/`listen_address`/`connect_address` it implied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionKind {
    Udp { local: Endpoint, remote: Endpoint },
    UdpServer { listen: Endpoint },
    UdpClient { remote: Endpoint },
    TcpServer { listen: Endpoint },
    TcpClient { remote: Endpoint },
}

impl ConnectionKind {
    /// HMAC wrapping is only meaningful for udp-server/udp-client; symmetric
    /// UDP and either TCP mode never support it (see DESIGN.md).
    pub fn supports_hmac(&self) -> bool {
        matches!(self, ConnectionKind::UdpServer { .. } | ConnectionKind::UdpClient { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    pub connection: ConnectionKind,
    pub hmac_key: Option<Vec<u8>>,
    pub input_devices: Vec<usize>,
    pub output_devices: Vec<usize>,
    pub virtual_ports: Vec<String>,
    pub input_ask: bool,
    pub output_ask: bool,
    /// Playback latency offset, in seconds (the file stores milliseconds).
    pub latency: f64,
    pub auto_latency: bool,
    pub duplication: u32,
    pub log_file: Option<String>,
}

/// Mutable accumulator used while scanning the file; folded into a
/// `Configuration` once a connection directive has been seen.
#[derive(Default)]
struct Builder {
    connection_type: Option<&'static str>,
    udp_local: Option<Endpoint>,
    udp_remote: Option<Endpoint>,
    listen_address: Option<Endpoint>,
    connect_address: Option<Endpoint>,
    hmac_key: Option<Vec<u8>>,
    input_devices: Vec<usize>,
    output_devices: Vec<usize>,
    virtual_ports: Vec<String>,
    input_ask: bool,
    output_ask: bool,
    latency: f64,
    auto_latency: bool,
    duplication: u32,
    log_file: Option<String>,
}

pub fn load(path: &Path) -> Result<Configuration, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse(&text)
}

fn parse_port(line: usize, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidPort {
        line,
        value: value.to_string(),
    })
}

fn parse_int(line: usize, directive: &str, value: &str) -> Result<i64, ConfigError> {
    value.parse::<i64>().map_err(|_| ConfigError::InvalidInteger {
        line,
        directive: directive.to_string(),
        value: value.to_string(),
    })
}

fn parse(text: &str) -> Result<Configuration, ConfigError> {
    let mut b = Builder {
        auto_latency: true,
        latency: 0.0,
        duplication: 1,
        ..Builder::default()
    };

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim_matches(|c: char| c == ' ' || c == '\t');
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let args: Vec<&str> = line.split_whitespace().collect();
        if args.is_empty() {
            continue;
        }
        let directive = args[0].to_lowercase();

        match directive.as_str() {
            "log" if args.len() == 2 => {
                b.log_file = Some(args[1].to_string());
            }
            "hmac" if args.len() == 2 => {
                b.hmac_key = Some(args[1].as_bytes().to_vec());
            }
            "input" if args.len() == 2 => {
                let index = parse_int(line_no, "input", args[1])?;
                b.input_devices.push(index.max(0) as usize);
            }
            "output" if args.len() == 2 => {
                let index = parse_int(line_no, "output", args[1])?;
                b.output_devices.push(index.max(0) as usize);
            }
            "input-ask" if args.len() == 1 => {
                b.input_ask = true;
            }
            "output-ask" if args.len() == 1 => {
                b.output_ask = true;
            }
            "port" if args.len() == 2 => {
                b.virtual_ports.push(args[1].to_string());
            }
            "duplication" if args.len() == 2 => {
                let n = parse_int(line_no, "duplication", args[1])?;
                b.duplication = n.max(1) as u32;
            }
            "latency" if args.len() == 2 => {
                let ms = args[1].parse::<f64>().map_err(|_| ConfigError::InvalidInteger {
                    line: line_no,
                    directive: "latency".to_string(),
                    value: args[1].to_string(),
                })?;
                b.latency = ms / 1000.0;
                b.auto_latency = false;
            }
            "udp-local" if args.len() == 3 => {
                b.udp_local = Some(Endpoint::new(args[1], parse_port(line_no, args[2])?));
                b.connection_type = Some("udp");
            }
            "udp-remote" if args.len() == 3 => {
                b.udp_remote = Some(Endpoint::new(args[1], parse_port(line_no, args[2])?));
                b.connection_type = Some("udp");
            }
            "tcp-server" if args.len() == 3 => {
                b.listen_address = Some(Endpoint::new(args[1], parse_port(line_no, args[2])?));
                b.connection_type = Some("tcp-server");
            }
            "tcp-client" if args.len() == 3 => {
                b.connect_address = Some(Endpoint::new(args[1], parse_port(line_no, args[2])?));
                b.connection_type = Some("tcp-client");
            }
            "udp-server" if args.len() == 3 => {
                b.listen_address = Some(Endpoint::new(args[1], parse_port(line_no, args[2])?));
                b.connection_type = Some("udp-server");
            }
            "udp-client" if args.len() == 3 => {
                b.connect_address = Some(Endpoint::new(args[1], parse_port(line_no, args[2])?));
                b.connection_type = Some("udp-client");
            }
            known @ ("log" | "hmac" | "input" | "output" | "port" | "duplication" | "latency"
            | "udp-local" | "udp-remote" | "tcp-server" | "tcp-client" | "udp-server"
            | "udp-client") => {
                return Err(ConfigError::WrongArgCount {
                    line: line_no,
                    directive: known.to_string(),
                    expected: expected_arity(known),
                    got: args.len() - 1,
                });
            }
            other => {
                return Err(ConfigError::UnknownDirective {
                    line: line_no,
                    directive: other.to_string(),
                });
            }
        }
    }

    let connection = match b.connection_type {
        Some("udp") => ConnectionKind::Udp {
            local: b.udp_local.ok_or(ConfigError::MissingConnection)?,
            remote: b.udp_remote.ok_or(ConfigError::MissingConnection)?,
        },
        Some("udp-server") => ConnectionKind::UdpServer {
            listen: b.listen_address.ok_or(ConfigError::MissingConnection)?,
        },
        Some("udp-client") => ConnectionKind::UdpClient {
            remote: b.connect_address.ok_or(ConfigError::MissingConnection)?,
        },
        Some("tcp-server") => ConnectionKind::TcpServer {
            listen: b.listen_address.ok_or(ConfigError::MissingConnection)?,
        },
        Some("tcp-client") => ConnectionKind::TcpClient {
            remote: b.connect_address.ok_or(ConfigError::MissingConnection)?,
        },
        _ => return Err(ConfigError::MissingConnection),
    };

    Ok(Configuration {
        connection,
        hmac_key: b.hmac_key,
        input_devices: b.input_devices,
        output_devices: b.output_devices,
        virtual_ports: b.virtual_ports,
        input_ask: b.input_ask,
        output_ask: b.output_ask,
        latency: b.latency,
        auto_latency: b.auto_latency,
        duplication: b.duplication,
        log_file: b.log_file,
    })
}

fn expected_arity(directive: &str) -> &'static str {
    match directive {
        "input-ask" | "output-ask" => "0",
        "udp-local" | "udp-remote" | "tcp-server" | "tcp-client" | "udp-server" | "udp-client" => {
            "2"
        }
        _ => "1",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_symmetric_udp_with_latency() {
        let text = "\
# comment\n\
udp-local 127.0.0.1 7000\n\
udp-remote 127.0.0.1 7001\n\
latency 50\n\
duplication 3\n\
port LoopbackOut\n";
        let cfg = parse(text).unwrap();
        assert_eq!(
            cfg.connection,
            ConnectionKind::Udp {
                local: Endpoint::new("127.0.0.1", 7000),
                remote: Endpoint::new("127.0.0.1", 7001),
            }
        );
        assert!((cfg.latency - 0.05).abs() < 1e-12);
        assert!(!cfg.auto_latency);
        assert_eq!(cfg.duplication, 3);
        assert_eq!(cfg.virtual_ports, vec!["LoopbackOut"]);
    }

    #[test]
    fn defaults_match_the_original() {
        let text = "udp-client 10.0.0.1 9000\n";
        let cfg = parse(text).unwrap();
        assert!(cfg.auto_latency);
        assert_eq!(cfg.latency, 0.0);
        assert_eq!(cfg.duplication, 1);
        assert!(!cfg.input_ask);
        assert!(!cfg.output_ask);
    }

    #[test]
    fn unknown_directive_is_an_error() {
        let text = "teleport 1 2 3\n";
        assert!(matches!(
            parse(text),
            Err(ConfigError::UnknownDirective { directive, .. }) if directive == "teleport"
        ));
    }

    #[test]
    fn directive_case_is_ignored() {
        let text = "UDP-CLIENT 127.0.0.1 9000\nHMAC secret\n";
        let cfg = parse(text).unwrap();
        assert!(cfg.connection.supports_hmac());
        assert_eq!(cfg.hmac_key, Some(b"secret".to_vec()));
    }

    #[test]
    fn missing_connection_directive_is_an_error() {
        let text = "latency 10\n";
        assert!(matches!(parse(text), Err(ConfigError::MissingConnection)));
    }

    #[test]
    fn wrong_arg_count_is_an_error() {
        let text = "udp-client 127.0.0.1\n";
        assert!(matches!(
            parse(text),
            Err(ConfigError::WrongArgCount { directive, .. }) if directive == "udp-client"
        ));
    }
}
