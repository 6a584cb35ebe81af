use clap::Parser;
use rustdis_client::{Config, Connection, Error, TcpTransport, Value};
use tracing::debug;

const PORT: u16 = 6379;

#[derive(Parser, Debug)]
struct Args {
    /// The host to connect to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// The port to connect to
    #[arg(short, long, default_value_t = PORT)]
    port: u16,

    /// Send every `;` separated command in a single pipeline
    #[arg(long)]
    pipeline: bool,

    /// The command to send, e.g. `SET key value`
    #[arg(required = true, trailing_var_arg = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let _ = tracing_subscriber::fmt()
        .try_init()
        .map_err(|e| debug!("Failed to initialize global tracing: {}", e));

    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    let mut conn: Connection<TcpTransport> = Connection::open(&addr, Config::from_env()).await;

    let replies = if args.pipeline {
        let mut pipeline = conn.pipeline();
        for words in split_commands(&args.command) {
            pipeline.command(&Value::command(words)).await?;
        }
        pipeline.execute().await?
    } else {
        vec![conn.send(&Value::command(args.command)).await?]
    };

    for reply in replies {
        println!("{}", reply);
    }

    conn.close().await
}

/// Splits `SET a 1 ; GET a` into `[[SET, a, 1], [GET, a]]`. A `;` may also end a word: `1;`.
fn split_commands(words: &[String]) -> Vec<Vec<String>> {
    let mut commands = vec![Vec::new()];
    for word in words {
        for (i, part) in word.split(';').enumerate() {
            if i > 0 {
                commands.push(Vec::new());
            }
            if !part.is_empty() {
                if let Some(current) = commands.last_mut() {
                    current.push(part.to_string());
                }
            }
        }
    }
    commands.retain(|command| !command.is_empty());
    commands
}
