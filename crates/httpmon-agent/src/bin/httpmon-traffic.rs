use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use std::env;
use std::fs::OpenOptions;
use std::io::Write;
use tokio::time::{sleep, Duration};

const ENDPOINTS: &[&str] = &["/api", "/", "/users/list", "/api/v2", "/list"];
const STATUSES: &[u16] = &[200, 201, 300, 301, 400, 500];
const METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE"];
const USERS: &[&str] = &["-", "james", "jill", "frank", "mary"];
const CLIENT_POOL: usize = 20;

#[derive(Debug)]
struct Config {
    path: String,
    interval_ms: u64,
    max_lines: usize,
    /// Zero runs until interrupted.
    iterations: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: "./access.log".to_string(),
            interval_ms: 1000,
            max_lines: 20,
            iterations: 0,
        }
    }
}

enum CliAction {
    Run(Config),
    Help,
}

#[allow(clippy::print_stdout)]
fn usage() {
    println!(
        "Usage:\n  httpmon-traffic [options]\n\nAppends random common log format lines to a file.\n\nOptions:\n  --path <file>          log file to append to (default: ./access.log)\n  --interval-ms <n>      pause between bursts (default: 1000)\n  --max-lines <n>        most lines per burst (default: 20)\n  --iterations <n>       bursts to write, 0 for no limit (default: 0)\n  -h, --help             show this help"
    );
}

fn parse_cli() -> Result<CliAction> {
    let mut config = Config::default();
    let mut args = env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(CliAction::Help),
            "--path" => {
                config.path = next_value(&mut args, "--path")?;
            }
            "--interval-ms" => {
                let value = next_value(&mut args, "--interval-ms")?;
                config.interval_ms = parse_u64(&value, "--interval-ms")?;
            }
            "--max-lines" => {
                let value = next_value(&mut args, "--max-lines")?;
                config.max_lines = parse_positive_usize(&value, "--max-lines")?;
            }
            "--iterations" => {
                let value = next_value(&mut args, "--iterations")?;
                config.iterations = parse_u64(&value, "--iterations")?;
            }
            _ => bail!("unknown argument: {arg}"),
        }
    }

    Ok(CliAction::Run(config))
}

fn next_value<I>(args: &mut I, flag: &str) -> Result<String>
where
    I: Iterator<Item = String>,
{
    args.next()
        .ok_or_else(|| anyhow!("missing value for {flag}"))
}

fn parse_positive_usize(value: &str, flag: &str) -> Result<usize> {
    let parsed = value
        .parse::<usize>()
        .with_context(|| format!("invalid number for {flag}: {value}"))?;
    if parsed == 0 {
        bail!("{flag} must be greater than 0");
    }
    Ok(parsed)
}

fn parse_u64(value: &str, flag: &str) -> Result<u64> {
    value
        .parse::<u64>()
        .with_context(|| format!("invalid number for {flag}: {value}"))
}

fn random_clients<R: Rng>(rng: &mut R) -> Vec<String> {
    (0..CLIENT_POOL)
        .map(|_| {
            format!(
                "{}.{}.{}.{}",
                rng.gen_range(1..=223u8),
                rng.gen::<u8>(),
                rng.gen::<u8>(),
                rng.gen_range(1..=254u8)
            )
        })
        .collect()
}

fn random_line<R: Rng>(rng: &mut R, clients: &[String]) -> String {
    let client = clients.choose(rng).map(String::as_str).unwrap_or("127.0.0.1");
    let user = USERS.choose(rng).copied().unwrap_or("-");
    let method = METHODS.choose(rng).copied().unwrap_or("GET");
    let endpoint = ENDPOINTS.choose(rng).copied().unwrap_or("/");
    let status = STATUSES.choose(rng).copied().unwrap_or(200);
    let bytes = rng.gen_range(100..5000u32);
    let time = Utc::now().format("%d/%b/%Y:%H:%M:%S %z");
    format!("{client} - {user} [{time}] \"{method} {endpoint} HTTP/1.0\" {status} {bytes}\n")
}

#[tokio::main]
async fn main() -> Result<()> {
    match parse_cli()? {
        CliAction::Help => {
            usage();
            Ok(())
        }
        CliAction::Run(config) => run(config).await,
    }
}

#[allow(clippy::print_stdout)]
async fn run(config: Config) -> Result<()> {
    let mut rng = rand::thread_rng();
    let clients = random_clients(&mut rng);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.path)
        .with_context(|| format!("failed to open {}", config.path))?;

    println!(
        "[httpmon-traffic] path={} interval_ms={} max_lines={} iterations={}",
        config.path, config.interval_ms, config.max_lines, config.iterations
    );

    let mut written = 0usize;
    let mut iteration = 0u64;
    while config.iterations == 0 || iteration < config.iterations {
        let count = rng.gen_range(0..=config.max_lines);
        let burst: String = (0..count)
            .map(|_| random_line(&mut rng, &clients))
            .collect();
        file.write_all(burst.as_bytes())
            .with_context(|| format!("failed to write {}", config.path))?;
        file.flush()?;
        written += count;
        iteration += 1;

        if config.interval_ms > 0 {
            sleep(Duration::from_millis(config.interval_ms)).await;
        }
    }

    println!("[httpmon-traffic] done lines={written}");
    Ok(())
}
