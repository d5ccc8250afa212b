//! Server configuration: environment variables, overridden by CLI flags.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_HTTP_PORT: u16 = 8000;
pub const DEFAULT_SESSION_TTL_SECS: u64 = 60 * 60;
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin";

pub const USAGE: &str = "lims server

USAGE:
  lims_server [--http-port N] [--data-dir PATH] [--session-ttl SECS] [--seed-demo]

OPTIONS:
  --http-port N        HTTP API port (env: LIMS_HTTP_PORT, default 8000)
  --data-dir PATH      Snapshot directory (env: LIMS_DATA_DIR, default: in-memory only)
  --session-ttl SECS   Bearer token lifetime (env: LIMS_SESSION_TTL_SECS, default 3600)
  --seed-demo          Load demo users and groups (env: LIMS_SEED_DEMO)
  -h, --help           Print this help

ENV:
  LIMS_ADMIN_PASSWORD  Password for the bootstrap admin account (default: admin)
  RUST_LOG             Log filter (default: info)
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub http_port: u16,
    pub data_dir: Option<PathBuf>,
    pub session_ttl: Duration,
    pub admin_password: String,
    pub seed_demo: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            data_dir: None,
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            admin_password: DEFAULT_ADMIN_PASSWORD.to_string(),
            seed_demo: false,
        }
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag {
            return args.get(i + 1).map(String::as_str);
        }
        i += 1;
    }
    None
}

pub fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

pub fn wants_help(args: &[String]) -> bool {
    has_flag(args, "--help") || has_flag(args, "-h")
}

impl ServerConfig {
    /// Build from process environment and arguments.
    pub fn from_env_and_args(args: &[String]) -> Self {
        Self::resolve(args, |k| std::env::var(k).ok())
    }

    /// `env` looks up a variable by name; unparseable values fall back to the default.
    pub fn resolve(args: &[String], env: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();

        let env_port = env("LIMS_HTTP_PORT").and_then(|v| v.parse::<u16>().ok());
        let env_dir = env("LIMS_DATA_DIR").filter(|v| !v.trim().is_empty());
        let env_ttl = env("LIMS_SESSION_TTL_SECS").and_then(|v| v.parse::<u64>().ok());
        let env_seed = env("LIMS_SEED_DEMO").and_then(|v| parse_bool(&v));

        let arg_port = arg_value(args, "--http-port").and_then(|v| v.parse::<u16>().ok());
        let arg_dir = arg_value(args, "--data-dir").map(str::to_string);
        let arg_ttl = arg_value(args, "--session-ttl").and_then(|v| v.parse::<u64>().ok());
        let arg_seed = has_flag(args, "--seed-demo").then_some(true);

        Self {
            http_port: arg_port.or(env_port).unwrap_or(d.http_port),
            data_dir: arg_dir.or(env_dir).map(PathBuf::from),
            session_ttl: arg_ttl.or(env_ttl).map(Duration::from_secs).unwrap_or(d.session_ttl),
            admin_password: env("LIMS_ADMIN_PASSWORD").filter(|v| !v.is_empty()).unwrap_or(d.admin_password),
            seed_demo: arg_seed.or(env_seed).unwrap_or(d.seed_demo),
        }
    }
}
