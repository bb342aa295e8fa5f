use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "cfgd-cli")]
#[command(about = "Management CLI for the cfgd configuration daemon", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Session token (obtained with `login`)
    #[arg(short, long, default_value = "")]
    token: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an edit session and print the token
    Login,
    /// End the edit session
    Logout,
    /// Show the running configuration
    Running,
    /// Show the open candidate configuration
    Candidate,
    /// Preview the diff a JSON patch would produce
    Diff { patch: String },
    /// Open or refresh a candidate from a JSON patch
    Update {
        patch: String,
        /// Override reference-integrity rejection of removals
        #[arg(long)]
        force: bool,
    },
    /// Apply the candidate to running
    Apply,
    /// Cancel the candidate
    Cancel,
    /// Inspect schema attributes at a path
    Schema { path: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if !cli.token.is_empty() {
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", cli.token))?,
        );
    }

    match cli.command {
        Commands::Login => {
            let res = client
                .post(format!("{}/session/token", cli.url))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Logout => {
            let res = client
                .delete(format!("{}/session/token", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Running => {
            let res = client
                .get(format!("{}/config/running", cli.url))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Candidate => {
            let res = client
                .get(format!("{}/config/candidate", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Diff { patch } => {
            let body: Value = serde_json::from_str(&patch)?;
            let res = client
                .post(format!("{}/config/running/diff", cli.url))
                .json(&body)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Update { patch, force } => {
            let body: Value = serde_json::from_str(&patch)?;
            let res = client
                .post(format!("{}/config/running/update?force={}", cli.url, force))
                .headers(headers)
                .json(&body)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Apply => {
            let res = client
                .put(format!("{}/config/candidate", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Cancel => {
            let res = client
                .delete(format!("{}/config/candidate", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Schema { path } => {
            let res = client
                .get(format!("{}/config/schema", cli.url))
                .query(&[("path", path)])
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
