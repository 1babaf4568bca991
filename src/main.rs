use std::time::Duration;

use clap::{Args, Parser};
use msfrpc::{ClientConfig, DecodeErrors, Fault, RpcClient, RpcError, TlsVerification, Value, safe_string};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error("login to {host} returned no token")]
    NoToken { host: String },
    #[error("login to {host} rejected: {fault}")]
    LoginRejected { host: String, fault: Fault },
    #[error("daemon returned error for {method}: {fault}")]
    Fault { method: String, fault: Fault },
    #[error("invalid JSON output: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "msfrpc", about = "Call a Metasploit RPC daemon method")]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Print the response body as text instead of decoding it.
    #[arg(long, default_value_t = false)]
    raw: bool,

    /// Quote string arguments for remote shell execution.
    #[arg(long, default_value_t = false)]
    quote: bool,

    /// RPC method, e.g. `core.version`, or `login` to only authenticate.
    method: String,

    /// Positional arguments; JSON literals are decoded, anything else is sent as a string.
    args: Vec<String>,
}

#[derive(Args, Debug)]
struct ConnectionArgs {
    #[arg(long, env = "MSFRPC_HOST", default_value = "127.0.0.1")]
    host: String,

    #[arg(long, env = "MSFRPC_PORT", default_value_t = 55553)]
    port: u16,

    #[arg(long, env = "MSFRPC_URI", default_value = "/api")]
    uri: String,

    #[arg(long, env = "MSFRPC_USER", default_value = "msf")]
    user: String,

    #[arg(long, env = "MSFRPC_PASS", hide_env_values = true)]
    pass: String,

    /// Use plain HTTP.
    #[arg(long, default_value_t = false)]
    no_ssl: bool,

    /// Verify the daemon's TLS certificate (off by default; msfrpcd is self-signed).
    #[arg(long, default_value_t = false)]
    tls_verify: bool,

    /// Treat undecodable responses as empty instead of failing.
    #[arg(long, default_value_t = false)]
    ignore_decode_errors: bool,

    #[arg(long, help = "Whole-request timeout in seconds")]
    timeout_secs: Option<u64>,

    #[arg(long, help = "Connect timeout in seconds")]
    connect_timeout_secs: Option<u64>,
}

impl ConnectionArgs {
    fn to_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(&self.host, self.port, &self.uri, &self.user, &self.pass, !self.no_ssl);
        if self.tls_verify {
            config = config.with_tls_verification(TlsVerification::Enabled);
        }
        if self.ignore_decode_errors {
            config = config.with_decode_errors(DecodeErrors::Ignore);
        }
        if let Some(secs) = self.timeout_secs {
            config = config.with_request_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.connect_timeout_secs {
            config = config.with_connect_timeout(Duration::from_secs(secs));
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.connection.to_config();
    if config.tls_verify == TlsVerification::Disabled && config.ssl {
        tracing::warn!("TLS certificate verification disabled; connection is open to interception");
    }
    let ignore_decode_errors = config.decode_errors == DecodeErrors::Ignore;
    let client = RpcClient::new(config);

    client.login().await?;
    ensure_connected(&client)?;
    if cli.method == "login" {
        println!("authenticated");
        return Ok(());
    }

    let args: Vec<Value> = cli.args.iter().map(|raw| parse_arg(raw, cli.quote)).collect();
    let raw = client.call(&cli.method, &args).await?;

    if cli.raw {
        println!("{}", raw.to_string_lossy());
        return Ok(());
    }

    match raw.to_value() {
        Ok(value) => {
            if let Some(fault) = value.fault() {
                return Err(CliError::Fault { method: cli.method, fault });
            }
            println!("{}", serde_json::to_string_pretty(&value.to_json())?);
        }
        Err(e) if ignore_decode_errors => {
            tracing::warn!(error = %e, "response not decodable; printing raw body");
            println!("{}", raw.to_string_lossy());
        }
        Err(e) => return Err(RpcError::Decode(e).into()),
    }
    Ok(())
}

fn ensure_connected(client: &RpcClient) -> Result<(), CliError> {
    if client.is_connected() {
        return Ok(());
    }
    let host = client.config().host.clone();
    Err(match client.login_fault() {
        Some(fault) => CliError::LoginRejected { host, fault },
        None => CliError::NoToken { host },
    })
}

/// Interpret one command-line argument.
///
/// JSON literals (`42`, `true`, `{"RHOSTS":"10.0.0.1"}`) become structured
/// values; anything that fails to parse is sent as a plain string.
fn parse_arg(raw: &str, quote: bool) -> Value {
    let value = serde_json::from_str::<serde_json::Value>(raw)
        .map_or_else(|_| Value::from(raw), |json| Value::from_json(&json));
    match value {
        Value::String(s) if quote => Value::String(safe_string(&s)),
        other => other,
    }
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
