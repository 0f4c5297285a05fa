pub mod card;
pub mod escrow;
pub mod wallet;

pub use card::{CardClient, CardProvider};
pub use escrow::{EscrowClient, EscrowProvider};
pub use wallet::{WalletClient, WalletProvider};
