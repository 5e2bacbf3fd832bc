//! Chain identifiers and the add-network parameter table.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Numeric identifier of an EVM network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(u64);

impl ChainId {
    pub const ETHEREUM_MAINNET: Self = Self(1);
    pub const SEPOLIA: Self = Self(11_155_111);
    pub const POLYGON: Self = Self(137);
    pub const POLYGON_AMOY: Self = Self(80_002);

    /// Networks the console knows how to register with a wallet.
    pub const KNOWN: [Self; 4] = [
        Self::ETHEREUM_MAINNET,
        Self::SEPOLIA,
        Self::POLYGON,
        Self::POLYGON_AMOY,
    ];

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    /// `0x`-prefixed lowercase hex, as used by `wallet_*` RPC methods.
    pub fn to_hex(self) -> String {
        format!("0x{:x}", self.0)
    }

    /// Parse a `0x`-prefixed hex or plain decimal chain id.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16).ok(),
            None => raw.parse::<u64>().ok(),
        };
        parsed.map(Self)
    }

    pub fn name(self) -> Option<&'static str> {
        match self {
            Self::ETHEREUM_MAINNET => Some("Ethereum Mainnet"),
            Self::SEPOLIA => Some("Sepolia"),
            Self::POLYGON => Some("Polygon Mainnet"),
            Self::POLYGON_AMOY => Some("Polygon Amoy"),
            _ => None,
        }
    }

    pub fn is_known(self) -> bool {
        Self::KNOWN.contains(&self)
    }
}

impl From<u64> for ChainId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", name, self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Parameter object for `wallet_addEthereumChain`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddEthereumChainParameter {
    pub chain_id: String,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    pub block_explorer_urls: Vec<String>,
}

impl AddEthereumChainParameter {
    /// Canonical parameters for a known chain.
    pub fn for_chain(chain_id: ChainId) -> Option<Self> {
        let (currency, rpc_url, explorer_url) = match chain_id {
            ChainId::ETHEREUM_MAINNET => (
                ("Ether", "ETH"),
                "https://eth.llamarpc.com",
                "https://etherscan.io/",
            ),
            ChainId::SEPOLIA => (
                ("Sepolia Ether", "ETH"),
                "https://rpc.sepolia.org",
                "https://sepolia.etherscan.io/",
            ),
            ChainId::POLYGON => (
                ("MATIC", "MATIC"),
                "https://rpc-mainnet.maticvigil.com/",
                "https://polygonscan.com/",
            ),
            ChainId::POLYGON_AMOY => (
                ("POL", "POL"),
                "https://rpc-amoy.polygon.technology/",
                "https://amoy.polygonscan.com/",
            ),
            _ => return None,
        };

        Some(Self {
            chain_id: chain_id.to_hex(),
            chain_name: chain_id.name()?.to_string(),
            native_currency: NativeCurrency {
                name: currency.0.to_string(),
                symbol: currency.1.to_string(),
                decimals: 18,
            },
            rpc_urls: vec![rpc_url.to_string()],
            block_explorer_urls: vec![explorer_url.to_string()],
        })
    }
}
