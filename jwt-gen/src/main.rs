use std::{fs, path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use convergence_guard::services::auth::{ServiceKeys, TokenIssuer};

/// Local helper for calling services by hand.
///
/// - `keygen`: print (or write) a fresh EC P-521 private key PEM
/// - `mint`:   sign an ES512 service token with the same claims the service client uses
#[derive(Parser, Debug)]
#[command(name = "jwt-gen", version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Keygen {
        /// Write the PEM here instead of stdout
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,

        /// Print the PEM on one line with `\n` escapes (for AUTH_SIGNING_KEY_PEM in .env)
        #[arg(long, default_value_t = false)]
        escaped: bool,
    },
    Mint {
        /// Path to the EC P-521 private key in PEM
        #[arg(long, value_name = "FILE")]
        private_pem: PathBuf,

        /// iss / sub of the token
        #[arg(long)]
        service: String,

        /// Single authority to put in `authorities`, e.g. authority::orders.read
        #[arg(long)]
        authority: Option<String>,

        /// Mark the token as an inter-service call
        #[arg(long, default_value_t = false)]
        service_call: bool,

        /// Lifetime in seconds
        #[arg(long, default_value_t = 60)]
        ttl: i64,

        /// Print only the token (no `Authorization:` prefix)
        #[arg(long, default_value_t = false)]
        quiet: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Command::Keygen { out, escaped } => {
            let (_, pem) = ServiceKeys::generate()?;
            let pem = if escaped { pem.replace('\n', "\\n") } else { pem };

            match out {
                Some(path) => {
                    fs::write(&path, pem)?;
                    println!("wrote {}", path.display());
                }
                None => println!("{}", pem),
            }
        }
        Command::Mint {
            private_pem,
            service,
            authority,
            service_call,
            ttl,
            quiet,
        } => {
            let pem = fs::read_to_string(&private_pem)?;
            let keys = Arc::new(ServiceKeys::from_private_pem(&pem)?);
            let issuer =
                TokenIssuer::new(service, keys).with_ttl(chrono::Duration::seconds(ttl));

            let token = issuer.mint(authority.as_deref(), service_call)?;

            if quiet {
                println!("{}", token);
            } else {
                println!("Authorization: Bearer {}", token);
            }
        }
    }

    Ok(())
}
