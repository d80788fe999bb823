//! Integration tests for wallet creation and transaction handling

use tallychain::blockchain::Blockchain;
use tallychain::config::ChainConfig;
use tallychain::crypto::ADDRESS_BYTES;
use tallychain::error::ChainError;
use tallychain::transaction::Transaction;
use tallychain::wallet::Wallet;
use tempfile::TempDir;

/// Helper to create a test wallet
fn create_test_wallet(name: &str) -> Result<Wallet, Box<dyn std::error::Error>> {
    Ok(Wallet::new(Some(name.to_string()))?)
}

/// Helper to get test directory
fn get_test_dir() -> Result<TempDir, Box<dyn std::error::Error>> {
    Ok(TempDir::new()?)
}

#[test]
fn test_wallet_creation() -> Result<(), Box<dyn std::error::Error>> {
    let wallet = create_test_wallet("test_wallet")?;

    assert_eq!(wallet.name, Some("test_wallet".to_string()));
    assert!(!wallet.secret_key_hex.is_empty());
    assert!(!wallet.created.is_empty());

    // 20 address bytes, hex encoded
    assert_eq!(wallet.address.len(), ADDRESS_BYTES * 2);
    assert!(wallet.address.chars().all(|c| c.is_ascii_hexdigit()));

    Ok(())
}

#[test]
fn test_create_two_wallets() -> Result<(), Box<dyn std::error::Error>> {
    let alice = create_test_wallet("alice")?;
    let bob = create_test_wallet("bob")?;

    assert_ne!(alice.address, bob.address);
    assert_ne!(alice.secret_key_hex, bob.secret_key_hex);

    Ok(())
}

#[test]
fn test_wallet_persistence() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = get_test_dir()?;
    let wallet_path = temp_dir.path().join("wallet.json");

    let original_wallet = create_test_wallet("persistent")?;
    original_wallet.save(&wallet_path)?;
    assert!(wallet_path.exists());

    let loaded_wallet = Wallet::load(&wallet_path)?;
    assert_eq!(original_wallet, loaded_wallet);

    Ok(())
}

#[test]
fn test_wallet_keypair_derivation() -> Result<(), Box<dyn std::error::Error>> {
    let wallet = create_test_wallet("keypair_test")?;
    let keypair = wallet.get_keypair()?;
    assert_eq!(wallet.address, keypair.address());
    Ok(())
}

#[test]
fn test_wallet_secret_key_encoding() -> Result<(), Box<dyn std::error::Error>> {
    let wallet = create_test_wallet("secret_test")?;
    let secret_bytes = hex::decode(&wallet.secret_key_hex)?;
    assert_eq!(secret_bytes.len(), 32);
    Ok(())
}

#[test]
fn test_multiple_wallets_isolation() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = get_test_dir()?;
    let mut saved = Vec::new();

    for name in ["wallet1", "wallet2", "wallet3"] {
        let wallet = create_test_wallet(name)?;
        let path = Wallet::default_path(temp_dir.path(), &wallet.address);
        wallet.save(&path)?;
        saved.push((name.to_string(), wallet.address, path));
    }

    for (name, address, path) in saved {
        let loaded = Wallet::load(&path)?;
        assert_eq!(loaded.name, Some(name));
        assert_eq!(loaded.address, address);
    }

    Ok(())
}

#[test]
fn test_blockchain_initialization() -> Result<(), Box<dyn std::error::Error>> {
    let blockchain = Blockchain::new(ChainConfig::with_difficulty(4))?;

    assert_eq!(blockchain.height(), 0);
    let genesis = blockchain.get_genesis_block()?;
    assert_eq!(genesis.header.index, 0);
    assert!(genesis.header.parent_hash.is_none());

    Ok(())
}

#[test]
fn test_transfer_transaction_creation() -> Result<(), Box<dyn std::error::Error>> {
    let alice = create_test_wallet("sender")?;
    let bob = create_test_wallet("recipient")?;

    let tx = alice.transfer(&bob.address, 100, 1)?;

    assert_eq!(tx.from, alice.address);
    assert_eq!(tx.to, bob.address);
    assert_eq!(tx.amount, 100);
    assert_eq!(tx.nonce, 1);
    assert_eq!(tx.hash, tx.calculate_hash());
    tx.verify_signed()?;

    Ok(())
}

#[test]
fn test_alice_to_bob_transaction() -> Result<(), Box<dyn std::error::Error>> {
    let alice = create_test_wallet("alice")?;
    let bob = create_test_wallet("bob")?;
    let chain = Blockchain::new(ChainConfig::with_difficulty(4))?;

    let mut account = chain.state.get_account(&alice.address)?;
    account.balance = 1_000;
    chain.state.save_account(&account)?;

    chain.submit_transaction(alice.transfer(&bob.address, 50, 1)?)?;
    chain.mine_block(&bob.address, 0)?;

    assert_eq!(chain.state.get_balance(&alice.address)?, 950);
    // Bob receives the transfer plus the block reward.
    assert_eq!(
        chain.state.get_balance(&bob.address)?,
        50 + chain.config().coinbase_reward
    );

    Ok(())
}

#[test]
fn test_transaction_signed_by_other_wallet_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let alice = create_test_wallet("alice")?;
    let mallory = create_test_wallet("mallory")?;
    let chain = Blockchain::new(ChainConfig::with_difficulty(4))?;

    // Mallory signs a transfer claiming to come from Alice.
    let mut tx = Transaction::new(
        alice.address.clone(),
        mallory.address.clone(),
        10,
        1,
        mallory.get_keypair()?.public_key_bytes().to_vec(),
    );
    tx.sign(&mallory.get_keypair()?)?;

    assert!(matches!(
        chain.submit_transaction(tx),
        Err(ChainError::InvalidSignature(_))
    ));
    assert_eq!(chain.mempool.pending_count(), 0);

    Ok(())
}
