use crate::server::error::ServerError;
use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use core::fmt;
use core::ops::RangeInclusive;
use core::str::FromStr;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Shortest accepted JWT signing key.
pub const MIN_JWT_KEY_LEN: usize = 6;
/// Work factors bcrypt accepts.
pub const BCRYPT_COST_RANGE: RangeInclusive<u32> = 4..=31;
/// Accepted root password lengths, the same bounds user passwords have.
pub const ROOT_PASSWORD_LEN: RangeInclusive<usize> = 6..=18;

/// Runtime configuration for the `miniblog-server` binary.
///
/// Every flag has an environment fallback, and a `.env` file in the working
/// directory is loaded before parsing. The raw arguments are validated as a
/// whole by `TryFrom<CliArgs> for ServerConfig`, so a bad setting is reported
/// before any listener is bound.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "miniblog-server",
    version,
    about = "Blog API server with gRPC, gRPC-gateway and plain HTTP front-ends"
)]
pub struct CliArgs {
    /// Which front-end to run: `grpc`, `grpc-gateway` or `http`.
    ///
    /// Environment variable: `SERVER_MODE`
    #[arg(long, env = "SERVER_MODE", default_value_t = String::from("grpc-gateway"))]
    pub server_mode: String,

    /// gRPC listen address. A bare `:port` listens on all interfaces.
    ///
    /// Environment variable: `GRPC_ADDR`
    #[arg(long, env = "GRPC_ADDR", default_value_t = String::from("0.0.0.0:8881"))]
    pub grpc_addr: String,

    /// HTTP listen address for the gateway and plain HTTP modes.
    ///
    /// Environment variable: `HTTP_ADDR`
    #[arg(long, env = "HTTP_ADDR", default_value_t = String::from("0.0.0.0:8880"))]
    pub http_addr: String,

    /// Serve every listener over TLS. Requires `--tls-cert` and `--tls-key`.
    ///
    /// Environment variable: `TLS_ENABLED`
    #[arg(long, env = "TLS_ENABLED", default_value_t = false)]
    pub tls: bool,

    /// PEM certificate chain.
    ///
    /// Environment variable: `TLS_CERT`
    #[arg(long, env = "TLS_CERT")]
    pub tls_cert: Option<PathBuf>,

    /// PEM private key.
    ///
    /// Environment variable: `TLS_KEY`
    #[arg(long, env = "TLS_KEY")]
    pub tls_key: Option<PathBuf>,

    /// Name the gateway expects in the gRPC listener's certificate.
    ///
    /// Environment variable: `TLS_SERVER_NAME`
    #[arg(long, env = "TLS_SERVER_NAME", default_value_t = String::from("localhost"))]
    pub tls_server_name: String,

    /// HMAC key used to sign and verify bearer tokens.
    ///
    /// Environment variable: `JWT_KEY`
    #[arg(long, env = "JWT_KEY")]
    pub jwt_key: String,

    /// Lifetime of issued tokens, in seconds.
    ///
    /// Environment variable: `TOKEN_TTL_SECS`
    #[arg(long, env = "TOKEN_TTL_SECS", default_value_t = 2 * 60 * 60)]
    pub token_ttl_secs: u64,

    /// Upper bound on graceful shutdown before listeners are force-closed.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT_SECS`
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 10)]
    pub shutdown_timeout_secs: u64,

    /// How long the gateway waits for the gRPC listener to report `SERVING`.
    ///
    /// Environment variable: `RPC_READY_TIMEOUT_SECS`
    #[arg(long, env = "RPC_READY_TIMEOUT_SECS", default_value_t = 5)]
    pub rpc_ready_timeout_secs: u64,

    /// Authentication used by the plain HTTP front-end.
    ///
    /// `bypass` trusts the `x-user-id` header and is meant for local
    /// development only.
    ///
    /// Environment variable: `HTTP_AUTH`
    #[arg(long, env = "HTTP_AUTH", value_enum, default_value_t = HttpAuthPolicy::Jwt)]
    pub http_auth: HttpAuthPolicy,

    /// bcrypt work factor for stored password hashes.
    ///
    /// Environment variable: `BCRYPT_COST`
    #[arg(long, env = "BCRYPT_COST", default_value_t = 10)]
    pub bcrypt_cost: u32,

    /// Password of the `root` account provisioned at startup.
    ///
    /// Without it the account still exists, reserving the username, but
    /// nobody can log in as root.
    ///
    /// Environment variable: `ROOT_PASSWORD`
    #[arg(long, env = "ROOT_PASSWORD", hide_env_values = true)]
    pub root_password: Option<String>,
}

/// The front-end topology, selected once at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerMode {
    Grpc,
    GrpcGateway,
    Http,
}

impl ServerMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Grpc => "grpc",
            Self::GrpcGateway => "grpc-gateway",
            Self::Http => "http",
        }
    }
}

impl FromStr for ServerMode {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "grpc" => Ok(Self::Grpc),
            "grpc-gateway" => Ok(Self::GrpcGateway),
            "http" => Ok(Self::Http),
            other => Err(ServerError::InvalidServerMode(other.to_owned())),
        }
    }
}

impl fmt::Display for ServerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the plain HTTP front-end establishes the caller's identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum HttpAuthPolicy {
    /// Bearer token in the `Authorization` header.
    Jwt,
    /// Trust the `x-user-id` header.
    Bypass,
}

#[derive(Clone, Debug)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub server_name: String,
}

#[derive(Clone)]
pub struct ServerConfig {
    pub mode: ServerMode,
    pub grpc_addr: SocketAddr,
    pub http_addr: SocketAddr,
    pub tls: Option<TlsConfig>,
    pub jwt_key: String,
    pub token_ttl: Duration,
    pub shutdown_timeout: Duration,
    pub rpc_ready_timeout: Duration,
    pub http_auth: HttpAuthPolicy,
    pub bcrypt_cost: u32,
    pub root_password: Option<String>,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("mode", &self.mode)
            .field("grpc_addr", &self.grpc_addr)
            .field("http_addr", &self.http_addr)
            .field("tls", &self.tls)
            .field("jwt_key", &"<redacted>")
            .field("token_ttl", &self.token_ttl)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("rpc_ready_timeout", &self.rpc_ready_timeout)
            .field("http_auth", &self.http_auth)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("root_password", &self.root_password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let mode = args.server_mode.parse::<ServerMode>()?;
        let grpc_addr = parse_listen_addr(&args.grpc_addr).context("invalid GRPC_ADDR")?;
        let http_addr = parse_listen_addr(&args.http_addr).context("invalid HTTP_ADDR")?;

        if args.jwt_key.len() < MIN_JWT_KEY_LEN {
            bail!("JWT_KEY must be at least {MIN_JWT_KEY_LEN} characters");
        }

        if args.token_ttl_secs == 0 {
            bail!("TOKEN_TTL_SECS must be greater than 0");
        }

        if !BCRYPT_COST_RANGE.contains(&args.bcrypt_cost) {
            bail!(
                "BCRYPT_COST ({}) must be between {} and {}",
                args.bcrypt_cost,
                BCRYPT_COST_RANGE.start(),
                BCRYPT_COST_RANGE.end()
            );
        }

        let root_password_len = args.root_password.as_ref().map(|p| p.chars().count());
        if root_password_len.is_some_and(|len| !ROOT_PASSWORD_LEN.contains(&len)) {
            bail!(
                "ROOT_PASSWORD must be between {} and {} characters",
                ROOT_PASSWORD_LEN.start(),
                ROOT_PASSWORD_LEN.end()
            );
        }

        let tls = if args.tls {
            let (Some(cert_path), Some(key_path)) = (args.tls_cert, args.tls_key) else {
                bail!("TLS_CERT and TLS_KEY are required when TLS is enabled");
            };
            Some(TlsConfig {
                cert_path,
                key_path,
                server_name: args.tls_server_name,
            })
        } else {
            None
        };

        Ok(Self {
            mode,
            grpc_addr,
            http_addr,
            tls,
            jwt_key: args.jwt_key,
            token_ttl: Duration::from_secs(args.token_ttl_secs),
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout_secs),
            rpc_ready_timeout: Duration::from_secs(args.rpc_ready_timeout_secs),
            http_auth: args.http_auth,
            bcrypt_cost: args.bcrypt_cost,
            root_password: args.root_password,
        })
    }
}

/// Parses `host:port`, accepting a bare `:port` as all interfaces.
fn parse_listen_addr(raw: &str) -> anyhow::Result<SocketAddr> {
    if let Some(port) = raw.strip_prefix(':') {
        let port = port.parse::<u16>().with_context(|| format!("bad port in `{raw}`"))?;
        return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port));
    }
    raw.parse::<SocketAddr>()
        .with_context(|| format!("`{raw}` is not a socket address"))
}
