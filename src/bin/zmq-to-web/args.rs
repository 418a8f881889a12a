use clap::Parser;

/// Reads measurements from the ZMQ endpoint and posts them to the HTTP API.
#[derive(Debug, Parser)]
pub struct Args {
    /// ZMQ endpoint to subscribe to (tcp://1.2.3.4:5555)
    #[arg(short = 'z', long, env = "ZMQ_ENDPOINT")]
    pub endpoint: String,

    /// Base API URL (http://1.2.3.4/api)
    #[arg(short = 'a', long, env = "API_URL")]
    pub api_url: String,

    /// Seconds without a message before resubscribing to the endpoint, 0 to never resubscribe
    #[arg(long, env = "ZMQ_IDLE_TIMEOUT", default_value_t = 60)]
    pub idle_timeout: u64,

    /// Enable debug output
    #[arg(short, long)]
    pub debug: bool,
}
