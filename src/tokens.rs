//! Token definitions and the per-chain registry
//!
//! The registry is built once at startup and handed to everything that
//! needs chain constants: wrapped native token, USD gas tokens (priority
//! ordered), routing bases and contract addresses.

use alloy_primitives::{address, Address};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::error::RouterError;

// ============================================
// CHAINS
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainId {
    Mainnet,
    Mode,
}

impl ChainId {
    pub fn id(&self) -> u64 {
        match self {
            ChainId::Mainnet => 1,
            ChainId::Mode => 919,
        }
    }

    /// OP-stack chains pay a separate fee for publishing calldata on L1
    pub fn has_l1_fee(&self) -> bool {
        matches!(self, ChainId::Mode)
    }
}

impl TryFrom<u64> for ChainId {
    type Error = RouterError;

    fn try_from(id: u64) -> Result<Self, Self::Error> {
        match id {
            1 => Ok(ChainId::Mainnet),
            919 => Ok(ChainId::Mode),
            other => Err(RouterError::invalid(format!("unsupported chain id {}", other))),
        }
    }
}

impl std::fmt::Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainId::Mainnet => write!(f, "mainnet"),
            ChainId::Mode => write!(f, "mode"),
        }
    }
}

// ============================================
// TOKENS
// ============================================

/// An ERC-20 token. Identity is (chain, address).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub chain_id: ChainId,
    pub address: Address,
    pub decimals: u8,
    pub symbol: String,
    pub name: String,
}

impl Token {
    pub fn new(
        chain_id: ChainId,
        address: Address,
        decimals: u8,
        symbol: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            chain_id,
            address,
            decimals,
            symbol: symbol.into(),
            name: name.into(),
        }
    }

    /// Canonical pool ordering: token0 has the lower address
    pub fn sorts_before(&self, other: &Token) -> bool {
        self.address < other.address
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.chain_id == other.chain_id && self.address == other.address
    }
}

impl Eq for Token {}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.chain_id.hash(state);
        self.address.hash(state);
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol)
    }
}

/// What the caller trades: the chain's native asset or a token
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Currency {
    Native(ChainId),
    Token(Token),
}

impl Currency {
    pub fn is_native(&self) -> bool {
        matches!(self, Currency::Native(_))
    }

    pub fn chain_id(&self) -> ChainId {
        match self {
            Currency::Native(chain) => *chain,
            Currency::Token(token) => token.chain_id,
        }
    }

    /// Routing always happens on the wrapped form
    pub fn wrapped(&self, registry: &TokenRegistry) -> Token {
        match self {
            Currency::Native(_) => registry.wrapped_native.clone(),
            Currency::Token(token) => token.clone(),
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            Currency::Native(_) => "ETH",
            Currency::Token(token) => &token.symbol,
        }
    }

    pub fn decimals(&self) -> u8 {
        match self {
            Currency::Native(_) => 18,
            Currency::Token(token) => token.decimals,
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

// ============================================
// CONTRACT ADDRESSES
// ============================================

/// Multicall3 (same address on all EVM chains)
pub const MULTICALL3: Address = address!("cA11bde05977b3631167028862bE2a173976CA11");

/// OP-stack GasPriceOracle predeploy
pub const OVM_GAS_PRICE_ORACLE: Address = address!("420000000000000000000000000000000000000F");

/// Placeholder used by wallets and aggregators for the native asset
pub const NATIVE_PLACEHOLDER: Address = address!("EeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE");

#[derive(Debug, Clone)]
pub struct ChainContracts {
    pub multicall: Address,
    pub quoter_v2: Option<Address>,
    pub swap_router_02: Option<Address>,
    pub gas_price_oracle: Option<Address>,
}

// ============================================
// REGISTRY
// ============================================

/// Chain constants the router needs. Built once, passed by handle.
#[derive(Debug, Clone)]
pub struct TokenRegistry {
    pub chain_id: ChainId,
    pub wrapped_native: Token,
    /// Priority ordered: the first one with a liquid pool against native wins
    pub usd_gas_tokens: Vec<Token>,
    /// Intermediates preferred when enumerating paths
    pub bases: Vec<Token>,
    pub contracts: ChainContracts,
    pub default_subgraph_url: Option<String>,
    known: HashMap<Address, Token>,
}

impl TokenRegistry {
    pub fn for_chain(chain_id: ChainId) -> Self {
        match chain_id {
            ChainId::Mainnet => Self::mainnet(),
            ChainId::Mode => Self::mode(),
        }
    }

    fn mainnet() -> Self {
        let chain = ChainId::Mainnet;
        let weth = Token::new(
            chain,
            address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"),
            18,
            "WETH",
            "Wrapped Ether",
        );
        let usdc = Token::new(
            chain,
            address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
            6,
            "USDC",
            "USD Coin",
        );
        let usdt = Token::new(
            chain,
            address!("dAC17F958D2ee523a2206206994597C13D831ec7"),
            6,
            "USDT",
            "Tether USD",
        );
        let dai = Token::new(
            chain,
            address!("6B175474E89094C44Da98b954EedcdeCB5BE3830"),
            18,
            "DAI",
            "Dai Stablecoin",
        );
        let wbtc = Token::new(
            chain,
            address!("2260FAC5E5542a773Aa44fBCfeDf7C193bc2C599"),
            8,
            "WBTC",
            "Wrapped BTC",
        );

        Self::build(
            chain,
            weth.clone(),
            vec![dai.clone(), usdc.clone(), usdt.clone()],
            vec![weth, dai, usdc, usdt, wbtc],
            ChainContracts {
                multicall: MULTICALL3,
                quoter_v2: Some(address!("61fFE014bA17989E743c5F6cB21bF9697530B21e")),
                swap_router_02: Some(address!("68b3465833fb72A70ecDF485E0e4C7bD8665Fc45")),
                gas_price_oracle: None,
            },
            None,
        )
    }

    fn mode() -> Self {
        let chain = ChainId::Mode;
        let weth = Token::new(
            chain,
            address!("4200000000000000000000000000000000000006"),
            18,
            "WETH",
            "Wrapped Ether",
        );
        let dai = Token::new(
            chain,
            address!("0f117Da8c078B83AD4136f0cF2e5058dAddb1151"),
            18,
            "DAI",
            "Dai Stablecoin",
        );
        let usdc = Token::new(
            chain,
            address!("4Cc496ca61683944f20a1C4796761273EE74FB62"),
            6,
            "USDC",
            "USD Coin",
        );
        let usdt = Token::new(
            chain,
            address!("4E6E66560165771FE0E15435367f8318bA2748Ec"),
            6,
            "USDT",
            "Tether USD",
        );
        let wbtc = Token::new(
            chain,
            address!("2aB8A15f4E5B19882D6D1aDd1C0Ecf50b3deB8a6"),
            8,
            "WBTC",
            "Wrapped BTC",
        );

        let mut registry = Self::build(
            chain,
            weth.clone(),
            vec![dai.clone(), usdc.clone(), usdt.clone()],
            vec![weth, dai, usdc, usdt],
            ChainContracts {
                multicall: MULTICALL3,
                quoter_v2: None,
                swap_router_02: Some(address!("9613da2D81495589CCe112CC4C7fC650A5eC2610")),
                gas_price_oracle: Some(OVM_GAS_PRICE_ORACLE),
            },
            Some(
                "https://api.goldsky.com/api/public/project_clvqb3g2poub601xzgkzc9oxs/subgraphs/udonswap-v3/1/gn"
                    .to_string(),
            ),
        );
        registry.known.insert(wbtc.address, wbtc);
        registry
    }

    fn build(
        chain_id: ChainId,
        wrapped_native: Token,
        usd_gas_tokens: Vec<Token>,
        bases: Vec<Token>,
        contracts: ChainContracts,
        default_subgraph_url: Option<String>,
    ) -> Self {
        let mut known = HashMap::new();
        for token in std::iter::once(&wrapped_native)
            .chain(usd_gas_tokens.iter())
            .chain(bases.iter())
        {
            known.insert(token.address, token.clone());
        }

        Self {
            chain_id,
            wrapped_native,
            usd_gas_tokens,
            bases,
            contracts,
            default_subgraph_url,
            known,
        }
    }

    pub fn with_quoter(mut self, quoter: Address) -> Self {
        self.contracts.quoter_v2 = Some(quoter);
        self
    }

    pub fn with_swap_router(mut self, router: Address) -> Self {
        self.contracts.swap_router_02 = Some(router);
        self
    }

    /// Tokens whose metadata never needs fetching
    pub fn known_tokens(&self) -> impl Iterator<Item = &Token> {
        self.known.values()
    }

    pub fn get(&self, address: &Address) -> Option<&Token> {
        self.known.get(address)
    }

    pub fn by_symbol(&self, symbol: &str) -> Option<&Token> {
        let wanted = symbol.to_lowercase();
        self.known.values().find(|t| t.symbol.to_lowercase() == wanted)
    }

    pub fn is_base(&self, address: &Address) -> bool {
        self.bases.iter().any(|t| t.address == *address)
    }

    pub fn is_wrapped_native(&self, address: &Address) -> bool {
        self.wrapped_native.address == *address
    }

    /// Resolve a CLI-style identifier: "ETH", a known symbol, or an address
    pub fn parse_currency(&self, input: &str) -> Option<Currency> {
        let trimmed = input.trim();
        if trimmed.eq_ignore_ascii_case("eth") || trimmed.eq_ignore_ascii_case("ether") {
            return Some(Currency::Native(self.chain_id));
        }
        if let Ok(addr) = trimmed.parse::<Address>() {
            if addr == NATIVE_PLACEHOLDER {
                return Some(Currency::Native(self.chain_id));
            }
            return Some(match self.get(&addr) {
                Some(token) => Currency::Token(token.clone()),
                None => Currency::Token(Token::new(self.chain_id, addr, 18, "UNKNOWN", "")),
            });
        }
        self.by_symbol(trimmed).cloned().map(Currency::Token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_registry() {
        let registry = TokenRegistry::for_chain(ChainId::Mode);
        assert_eq!(registry.wrapped_native.symbol, "WETH");
        assert_eq!(registry.usd_gas_tokens[0].symbol, "DAI");
        assert_eq!(registry.usd_gas_tokens.len(), 3);
        assert!(registry.is_base(&registry.wrapped_native.address));
        assert!(registry.by_symbol("wbtc").is_some());
        assert!(registry.contracts.gas_price_oracle.is_some());
    }

    #[test]
    fn test_token_identity_ignores_metadata() {
        let registry = TokenRegistry::for_chain(ChainId::Mainnet);
        let mut renamed = registry.wrapped_native.clone();
        renamed.symbol = "ETH2".to_string();
        assert_eq!(renamed, registry.wrapped_native);
    }

    #[test]
    fn test_native_resolves_to_wrapped() {
        let registry = TokenRegistry::for_chain(ChainId::Mode);
        let native = registry.parse_currency("ETH").unwrap();
        assert!(native.is_native());
        assert_eq!(native.wrapped(&registry), registry.wrapped_native);

        let usdc = registry.parse_currency("USDC").unwrap();
        assert!(!usdc.is_native());
    }

    #[test]
    fn test_unknown_chain() {
        assert!(ChainId::try_from(56).is_err());
        assert_eq!(ChainId::try_from(919).unwrap(), ChainId::Mode);
    }
}
