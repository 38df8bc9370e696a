//! keygen — generate a warden signer identity file.

use std::path::PathBuf;

use clap::Parser;
use serde::Serialize;

use warden_crypto::NodeSigner;

#[derive(Parser, Debug)]
#[command(name = "keygen", version, about = "Generate a warden Ed25519 signer key file")]
struct Args {
    /// Where to write the key file.
    #[arg(long, default_value = "signer.json")]
    out: PathBuf,

    /// Overwrite an existing file.
    #[arg(long)]
    force: bool,
}

#[derive(Serialize)]
struct SignerKeyFile {
    seed_hex: String,
    public_key_hex: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if args.out.exists() && !args.force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite",
            args.out.display()
        );
    }

    let signer = NodeSigner::generate();
    let file = SignerKeyFile {
        seed_hex: hex::encode(signer.seed_bytes().as_ref()),
        public_key_hex: signer.public_key().to_hex(),
    };
    std::fs::write(&args.out, serde_json::to_string_pretty(&file)?)?;

    println!("wrote {}", args.out.display());
    println!("public key: {}", signer.public_key().to_hex());
    Ok(())
}
