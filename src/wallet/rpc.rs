//! JSON-RPC helpers over a live [`Provider`].

use serde_json::{Value, json};

use super::{AddEthereumChainParameter, ChainId, Provider};
use crate::error::{NetworkSwitchError, WalletError};

/// Accounts exposed by the provider, lowercased. Errors if none are exposed.
pub async fn fetch_accounts(provider: &dyn Provider) -> Result<Vec<String>, WalletError> {
    let method = "eth_accounts";
    let value = provider.request(method, None).await?;
    let accounts: Vec<String> =
        serde_json::from_value(value).map_err(|e| WalletError::InvalidResponse {
            method: method.to_string(),
            reason: e.to_string(),
        })?;

    if accounts.is_empty() {
        return Err(WalletError::NotConnected);
    }

    Ok(accounts
        .into_iter()
        .map(|account| account.to_ascii_lowercase())
        .collect())
}

/// Chain currently selected by the provider.
pub async fn fetch_chain_id(provider: &dyn Provider) -> Result<ChainId, WalletError> {
    let method = "eth_chainId";
    let value = provider.request(method, None).await?;
    let parsed = match &value {
        Value::String(raw) => ChainId::parse(raw),
        Value::Number(n) => n.as_u64().map(ChainId::new),
        _ => None,
    };
    parsed.ok_or_else(|| WalletError::InvalidResponse {
        method: method.to_string(),
        reason: format!("not a chain id: {value}"),
    })
}

/// Ask the provider to switch networks, registering the network first if the
/// provider does not recognize it.
pub async fn switch_to_chain_id(
    provider: &dyn Provider,
    chain_id: ChainId,
) -> Result<(), NetworkSwitchError> {
    let switch = provider
        .request(
            "wallet_switchEthereumChain",
            Some(json!([{ "chainId": chain_id.to_hex() }])),
        )
        .await;

    match switch {
        Ok(_) => Ok(()),
        Err(err) if err.rpc_code() == Some(WalletError::UNRECOGNIZED_CHAIN) => {
            tracing::info!(chain_id = chain_id.value(), "Chain unknown to provider, adding it");
            add_network(provider, chain_id)
                .await
                .map_err(NetworkSwitchError::AddNetwork)
        }
        Err(err) => Err(NetworkSwitchError::Switch(err.to_string())),
    }
}

async fn add_network(provider: &dyn Provider, chain_id: ChainId) -> Result<(), String> {
    let params = AddEthereumChainParameter::for_chain(chain_id)
        .ok_or_else(|| format!("unsupported chain {}", chain_id.value()))?;
    let params = serde_json::to_value(params).map_err(|e| e.to_string())?;

    provider
        .request("wallet_addEthereumChain", Some(json!([params])))
        .await
        .map_err(|e| e.to_string())?;

    let current = fetch_chain_id(provider).await.map_err(|e| e.to_string())?;
    if current != chain_id {
        return Err("chainId did not change after adding network".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    /// Scripted provider: each method returns a queued response.
    #[derive(Debug, Default)]
    struct ScriptedProvider {
        responses: Mutex<Vec<(&'static str, Result<Value, WalletError>)>>,
        calls: Mutex<Vec<(String, Option<Value>)>>,
    }

    impl ScriptedProvider {
        fn with(responses: Vec<(&'static str, Result<Value, WalletError>)>) -> Self {
            Self {
                responses: Mutex::new(responses),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn methods(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(m, _)| m.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        async fn request(
            &self,
            method: &str,
            params: Option<Value>,
        ) -> Result<Value, WalletError> {
            self.calls
                .lock()
                .unwrap()
                .push((method.to_string(), params));
            let mut responses = self.responses.lock().unwrap();
            let idx = responses
                .iter()
                .position(|(m, _)| *m == method)
                .unwrap_or_else(|| panic!("unexpected request {method}"));
            responses.remove(idx).1
        }
    }

    #[tokio::test]
    async fn accounts_are_lowercased() {
        let provider = ScriptedProvider::with(vec![(
            "eth_accounts",
            Ok(json!(["0xABCdef0000000000000000000000000000000001"])),
        )]);
        let accounts = fetch_accounts(&provider).await.unwrap();
        assert_eq!(accounts, vec!["0xabcdef0000000000000000000000000000000001"]);
    }

    #[tokio::test]
    async fn empty_accounts_means_not_connected() {
        let provider = ScriptedProvider::with(vec![("eth_accounts", Ok(json!([])))]);
        let err = fetch_accounts(&provider).await.unwrap_err();
        assert!(matches!(err, WalletError::NotConnected));
    }

    #[tokio::test]
    async fn chain_id_accepts_hex_and_numbers() {
        let provider = ScriptedProvider::with(vec![
            ("eth_chainId", Ok(json!("0x89"))),
            ("eth_chainId", Ok(json!(80002))),
        ]);
        assert_eq!(fetch_chain_id(&provider).await.unwrap(), ChainId::POLYGON);
        assert_eq!(
            fetch_chain_id(&provider).await.unwrap(),
            ChainId::POLYGON_AMOY
        );
    }

    #[tokio::test]
    async fn switch_success_sends_hex_chain_id() {
        let provider =
            ScriptedProvider::with(vec![("wallet_switchEthereumChain", Ok(Value::Null))]);
        switch_to_chain_id(&provider, ChainId::POLYGON)
            .await
            .unwrap();

        let calls = provider.calls.lock().unwrap();
        assert_eq!(calls[0].1, Some(json!([{ "chainId": "0x89" }])));
    }

    #[tokio::test]
    async fn unknown_chain_adds_network_once_then_verifies() {
        let provider = ScriptedProvider::with(vec![
            (
                "wallet_switchEthereumChain",
                Err(WalletError::rpc(4902, "Unrecognized chain ID")),
            ),
            ("wallet_addEthereumChain", Ok(Value::Null)),
            ("eth_chainId", Ok(json!("0x89"))),
        ]);
        switch_to_chain_id(&provider, ChainId::POLYGON)
            .await
            .unwrap();
        assert_eq!(
            provider.methods(),
            vec![
                "wallet_switchEthereumChain",
                "wallet_addEthereumChain",
                "eth_chainId"
            ]
        );
    }

    #[tokio::test]
    async fn add_network_mismatch_is_reported() {
        let provider = ScriptedProvider::with(vec![
            (
                "wallet_switchEthereumChain",
                Err(WalletError::rpc(4902, "Unrecognized chain ID")),
            ),
            ("wallet_addEthereumChain", Ok(Value::Null)),
            ("eth_chainId", Ok(json!("0x1"))),
        ]);
        let err = switch_to_chain_id(&provider, ChainId::POLYGON)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Error adding network: chainId did not change after adding network"
        );
    }

    #[tokio::test]
    async fn other_switch_failures_are_not_retried() {
        let provider = ScriptedProvider::with(vec![(
            "wallet_switchEthereumChain",
            Err(WalletError::rpc(4001, "User rejected the request.")),
        )]);
        let err = switch_to_chain_id(&provider, ChainId::POLYGON)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Error switching network: User rejected the request."
        );
        assert_eq!(provider.methods(), vec!["wallet_switchEthereumChain"]);
    }
}
