use clap::builder::TypedValueParser as _;
use clap::Parser;
use dotenvy::dotenv;
use log::LevelFilter;
use router::DispatchMode;
use rpc::error::{Error as RpcError, ErrorKind as RpcErrorKind};
use rpc::{Endpoint, PoolOptions};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq)]
pub enum RustEnv {
    Development,
    Production,
    Staging,
}

#[derive(Debug, PartialEq, Eq)]
pub struct RustEnvParseError;

impl FromStr for RustEnv {
    type Err = RustEnvParseError;
    fn from_str(level: &str) -> Result<RustEnv, Self::Err> {
        match level.to_lowercase().as_str() {
            "development" => Ok(RustEnv::Development),
            "production" => Ok(RustEnv::Production),
            "staging" => Ok(RustEnv::Staging),
            _ => Err(RustEnvParseError),
        }
    }
}

impl fmt::Display for RustEnv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RustEnv::Development => write!(f, "development"),
            RustEnv::Production => write!(f, "production"),
            RustEnv::Staging => write!(f, "staging"),
        }
    }
}

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Routing nodes as `node=network:address` entries, e.g. `1=tcp:10.0.0.1:7270`.
    #[arg(
        long,
        env,
        value_delimiter = ',',
        use_value_delimiter = true,
        default_value = "1=tcp:127.0.0.1:7270"
    )]
    router_addrs: Vec<String>,

    /// Edge servers as `serverId=network:address` entries; ids are integers.
    #[arg(
        long,
        env,
        value_delimiter = ',',
        use_value_delimiter = true,
        default_value = "1=tcp:127.0.0.1:8092"
    )]
    comet_addrs: Vec<String>,

    /// Broker list for a deployment-provided queue producer. The bundled
    /// channel producer does not connect to brokers and only logs records.
    #[arg(
        long,
        env,
        value_delimiter = ',',
        use_value_delimiter = true,
        default_value = "127.0.0.1:9092"
    )]
    pub kafka_addrs: Vec<String>,

    /// Topic that push intents are published to
    #[arg(long, env, default_value = "KafkaPushsTopic")]
    pub push_topic: String,

    /// Per-call RPC timeout in milliseconds
    #[arg(long, env, default_value_t = 1000)]
    pub rpc_timeout_ms: u64,

    /// Timeout in milliseconds for establishing an RPC connection
    #[arg(long, env, default_value_t = 3000)]
    pub dial_timeout_ms: u64,

    /// Milliseconds between health-check pings on every pooled connection
    #[arg(long, env, default_value_t = 1000)]
    pub ping_interval_ms: u64,

    /// First reconnect delay in milliseconds; doubles on every failed attempt
    #[arg(long, env, default_value_t = 100)]
    pub reconnect_base_ms: u64,

    /// Upper bound in milliseconds for the reconnect delay
    #[arg(long, env, default_value_t = 10000)]
    pub reconnect_max_ms: u64,

    /// Resolve the routing nodes of one push `sequential`ly or `concurrent`ly
    #[arg(
        long,
        env,
        default_value_t = DispatchMode::Concurrent,
        value_parser = clap::builder::PossibleValuesParser::new(["sequential", "concurrent"])
            .map(|s| s.parse::<DispatchMode>().unwrap()),
        )]
    pub dispatch_mode: DispatchMode,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap()),
        )]
    pub log_level_filter: LevelFilter,

    /// Set the Rust runtime environment to use.
    #[arg(
    short,
    long,
    env,
    default_value_t = RustEnv::Development,
    value_parser = clap::builder::PossibleValuesParser::new([
        "DEVELOPMENT", "PRODUCTION", "STAGING",
        "development", "production", "staging"
    ])
        .map(|s| s.parse::<RustEnv>().unwrap()),
    )]
    pub runtime_env: RustEnv,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    /// Parse flags from `args` only, without reading `.env`.
    pub fn from_args<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Config::parse_from(args)
    }

    pub fn set_router_addrs(mut self, addrs: Vec<String>) -> Self {
        self.router_addrs = addrs;
        self
    }

    pub fn set_comet_addrs(mut self, addrs: Vec<String>) -> Self {
        self.comet_addrs = addrs;
        self
    }

    /// Routing node endpoints keyed by node name.
    pub fn router_endpoints(&self) -> Result<HashMap<String, Endpoint>, RpcError> {
        parse_endpoints(&self.router_addrs, |id| Ok(id.to_string()))
    }

    /// Edge server endpoints keyed by server id.
    pub fn comet_endpoints(&self) -> Result<HashMap<i32, Endpoint>, RpcError> {
        parse_endpoints(&self.comet_addrs, |id| {
            id.parse::<i32>()
                .map_err(|_| config_error(&format!("comet server id \"{id}\" is not an integer")))
        })
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    /// Supervisor settings shared by the router and comet pools.
    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            ping_method: None,
            ping_interval: Duration::from_millis(self.ping_interval_ms),
            reconnect_base: Duration::from_millis(self.reconnect_base_ms),
            reconnect_max: Duration::from_millis(self.reconnect_max_ms),
        }
    }

    pub fn runtime_env(&self) -> RustEnv {
        self.runtime_env.clone()
    }

    pub fn is_production(&self) -> bool {
        self.runtime_env() == RustEnv::Production
    }
}

fn config_error(message: &str) -> RpcError {
    RpcError::new(RpcErrorKind::Config, message)
}

/// Parse `id=network:address` entries. Ids must be unique.
fn parse_endpoints<K, F>(entries: &[String], parse_id: F) -> Result<HashMap<K, Endpoint>, RpcError>
where
    K: Eq + std::hash::Hash + fmt::Display,
    F: Fn(&str) -> Result<K, RpcError>,
{
    let mut endpoints = HashMap::new();
    for entry in entries.iter().map(|entry| entry.trim()).filter(|e| !e.is_empty()) {
        let (id, address) = entry
            .split_once('=')
            .ok_or_else(|| config_error(&format!("\"{entry}\" is not id=network:address")))?;
        let id = parse_id(id.trim())?;
        let endpoint: Endpoint = address.trim().parse()?;
        if endpoints.contains_key(&id) {
            return Err(config_error(&format!("endpoint id {id} configured twice")));
        }
        endpoints.insert(id, endpoint);
    }
    Ok(endpoints)
}
