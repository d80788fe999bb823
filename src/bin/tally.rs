#![forbid(unsafe_code)]
//! Command-line front end for a local TallyChain ledger.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tallychain::blockchain::Blockchain;
use tallychain::cli::{
    format_block, init_tracing, load_blockchain_from_config, save_pending, short_hash,
    suggest_nonce,
};
use tallychain::config::Config;
use tallychain::miner::CancelToken;
use tallychain::wallet::Wallet;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show height, tip and pending transaction count
    Status,
    /// Mine one block from the pending transactions
    Mine {
        /// Beneficiary address; defaults to miner.beneficiary_address
        #[arg(long)]
        miner: Option<String>,
        /// Maximum pending transactions to include (0 = all)
        #[arg(long)]
        batch: Option<usize>,
        /// Worker threads for the proof-of-work search
        #[arg(long)]
        threads: Option<usize>,
    },
    /// Print the balance and nonce of an address
    Balance { address: String },
    /// Print every block from the tip down to genesis
    PrintChain,
    /// Generate a new key pair and save it in the wallet directory
    CreateWallet {
        #[arg(long)]
        name: Option<String>,
    },
    /// Sign a transfer with a saved wallet and add it to the mempool
    Send {
        /// Wallet file, or an address found in the wallet directory
        #[arg(long)]
        wallet: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: u64,
        /// Override the nonce; defaults to the next free one
        #[arg(long)]
        nonce: Option<u64>,
    },
    /// Credit an address directly, bypassing consensus (development only)
    Fund { address: String, amount: u64 },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();
    let (config, chain) = load_blockchain_from_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Status => status(&chain)?,
        Commands::Mine {
            miner,
            batch,
            threads,
        } => mine(&chain, &config, miner, batch, threads)?,
        Commands::Balance { address } => {
            let account = chain.state.get_account(&address)?;
            println!("{} {}", "Address:".bright_white(), account.address);
            println!("{} {}", "Balance:".bright_white(), account.balance.to_string().bright_green());
            println!("{} {}", "Nonce:  ".bright_white(), account.nonce);
        }
        Commands::PrintChain => {
            chain.iterate_blocks(|block| {
                println!("{}", format_block(block));
                Ok(())
            })?;
        }
        Commands::CreateWallet { name } => {
            let wallet = Wallet::new(name)?;
            let path = Wallet::default_path(Path::new(&config.wallet.dir), &wallet.address);
            wallet.save(&path)?;
            println!("{}", "Wallet created".bright_green().bold());
            println!("  address: {}", wallet.address.bright_yellow());
            println!("  file:    {}", path.display());
        }
        Commands::Send {
            wallet,
            to,
            amount,
            nonce,
        } => send(&chain, &config, &wallet, &to, amount, nonce)?,
        Commands::Fund { address, amount } => {
            let mut account = chain.state.get_account(&address)?;
            account.balance = account
                .balance
                .checked_add(amount)
                .ok_or("balance overflow")?;
            chain.state.save_account(&account)?;
            println!(
                "{} {} now holds {}",
                "Funded".yellow(),
                address,
                account.balance
            );
        }
    }

    Ok(())
}

fn status(chain: &Blockchain) -> Result<(), Box<dyn std::error::Error>> {
    let status = chain.status()?;
    println!("{}", "TallyChain".bright_cyan().bold());
    println!("  height:      {}", status.height);
    println!("  tip:         {}", hex::encode(status.tip_hash));
    println!("  genesis:     {}", hex::encode(status.genesis_hash));
    println!("  difficulty:  {}", status.difficulty);
    println!("  reward:      {}", status.coinbase_reward);
    println!("  accounts:    {}", status.accounts);
    println!("  pending txs: {}", status.pending_transactions);
    Ok(())
}

fn mine(
    chain: &Blockchain,
    config: &Config,
    miner: Option<String>,
    batch: Option<usize>,
    threads: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let miner = miner
        .or_else(|| config.miner.beneficiary_address.clone())
        .ok_or("no miner address: pass --miner or set miner.beneficiary_address")?;
    let batch = batch.unwrap_or(config.miner.batch_size);
    let threads = threads.unwrap_or(config.miner.threads);

    println!(
        "{} block {} at difficulty {}...",
        "Mining".bright_cyan(),
        chain.height() + 1,
        chain.config().difficulty
    );
    let started = Instant::now();
    let block = chain.mine_block_with(&miner, batch, threads, &CancelToken::new())?;
    let elapsed = started.elapsed();
    save_pending(chain, config)?;

    println!("{}", "Block mined".bright_green().bold());
    println!("  height:       {}", block.header.index);
    println!("  hash:         {}", block.hash_str());
    println!("  nonce:        {}", block.header.nonce);
    println!("  transactions: {}", block.transactions.len());
    println!("  time:         {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn send(
    chain: &Blockchain,
    config: &Config,
    wallet: &str,
    to: &str,
    amount: u64,
    nonce: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = Path::new(wallet);
    let wallet = if path.exists() {
        Wallet::load(path)?
    } else {
        Wallet::load(&Wallet::default_path(Path::new(&config.wallet.dir), wallet))?
    };

    let nonce = match nonce {
        Some(nonce) => nonce,
        None => suggest_nonce(chain, &wallet.address)?,
    };
    let tx = wallet.transfer(to, amount, nonce)?;
    let hash = tx.hash_str();
    chain.submit_transaction(tx)?;
    save_pending(chain, config)?;

    println!(
        "{} {} -> {} amount {} nonce {}",
        "Queued".bright_green(),
        short_hash(&wallet.address),
        short_hash(to),
        amount,
        nonce
    );
    println!("  tx: {}", hash.bright_yellow());
    Ok(())
}
