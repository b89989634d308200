//! Flavor-specific block tracing.
//!
//! Both flavors start with the block header (`eth_getBlockByNumber`, hashes
//! only) and the chain id, so a trace file is self-describing.
//!
//! # jerigon
//! One `debug_traceBlockByNumber` call with the `zeroTracer`, which returns
//! a trace per transaction, plus `eth_getWitness` for the block's combined
//! trie pre-images.
//!
//! # native
//! For every transaction hash in the header: the transaction, its receipt,
//! and two runs of the built-in `prestateTracer` (the full pre-state and the
//! state diff). The four calls for one transaction run concurrently.

use futures::try_join;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use blockdebug_core::RpcFlavor;

use crate::error::RpcError;
use crate::request::block_tag;
use crate::transport::RpcTransport;

/// Trace of a single transaction as returned by the node's tracer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxTrace {
    pub tx_hash: String,
    /// `zeroTracer` result (jerigon) or `prestateTracer` diff (native).
    pub trace: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt: Option<Value>,
    /// Accounts touched by the transaction as they were before it ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_state: Option<Value>,
}

/// Everything fetched for one block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockTrace {
    pub block: u64,
    pub flavor: String,
    pub chain_id: String,
    /// Block header with transaction hashes, as returned by the node.
    pub header: Value,
    pub transactions: Vec<TxTrace>,
    /// Combined trie pre-images; only the jerigon flavor provides them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub witness: Option<Value>,
}

/// Per-transaction result of the `zeroTracer`.
#[derive(Debug, Deserialize)]
struct ZeroTxResult {
    #[serde(rename = "txHash")]
    tx_hash: String,
    result: Value,
}

/// Header fields needed from `eth_getBlockByNumber` with hashes only.
#[derive(Debug, Deserialize)]
struct BlockHashes {
    transactions: Vec<String>,
}

/// Trace `block` using the tracing dialect selected by `flavor`.
pub async fn trace_block<T: RpcTransport>(
    transport: &T,
    flavor: &RpcFlavor,
    block: u64,
) -> Result<Option<BlockTrace>, RpcError> {
    match flavor {
        RpcFlavor::Jerigon => jerigon(transport, block).await.map(Some),
        RpcFlavor::Native => native(transport, block).await.map(Some),
        RpcFlavor::Other(_) => Ok(None),
    }
}

/// Header and chain id, common to every flavor.
async fn block_context<T: RpcTransport>(
    transport: &T,
    block: u64,
) -> Result<(Value, String), RpcError> {
    let header: Option<Value> = transport
        .call(
            "eth_getBlockByNumber",
            vec![json!(block_tag(block)), json!(false)],
        )
        .await?;
    let header = header.ok_or(RpcError::BlockNotFound(block))?;
    let chain_id: String = transport.call("eth_chainId", vec![]).await?;
    Ok((header, chain_id))
}

async fn jerigon<T: RpcTransport>(transport: &T, block: u64) -> Result<BlockTrace, RpcError> {
    let (header, chain_id) = block_context(transport, block).await?;
    let tag = block_tag(block);
    let results: Vec<ZeroTxResult> = transport
        .call(
            "debug_traceBlockByNumber",
            vec![json!(tag), json!({"tracer": "zeroTracer"})],
        )
        .await?;
    let witness: Value = transport.call("eth_getWitness", vec![json!(tag)]).await?;

    Ok(BlockTrace {
        block,
        flavor: RpcFlavor::Jerigon.to_string(),
        chain_id,
        header,
        transactions: results
            .into_iter()
            .map(|r| TxTrace {
                tx_hash: r.tx_hash,
                trace: r.result,
                transaction: None,
                receipt: None,
                pre_state: None,
            })
            .collect(),
        witness: Some(witness),
    })
}

async fn native<T: RpcTransport>(transport: &T, block: u64) -> Result<BlockTrace, RpcError> {
    let (header, chain_id) = block_context(transport, block).await?;
    let hashes: BlockHashes = serde_json::from_value(header.clone())?;

    let mut transactions = Vec::with_capacity(hashes.transactions.len());
    for tx_hash in hashes.transactions {
        transactions.push(native_tx(transport, tx_hash).await?);
    }

    Ok(BlockTrace {
        block,
        flavor: RpcFlavor::Native.to_string(),
        chain_id,
        header,
        transactions,
        witness: None,
    })
}

async fn native_tx<T: RpcTransport>(
    transport: &T,
    tx_hash: String,
) -> Result<TxTrace, RpcError> {
    let (transaction, receipt, pre_state, diff) = try_join!(
        transport.call::<Value>("eth_getTransactionByHash", vec![json!(tx_hash)]),
        transport.call::<Value>("eth_getTransactionReceipt", vec![json!(tx_hash)]),
        transport.call::<Value>(
            "debug_traceTransaction",
            vec![json!(tx_hash), json!({"tracer": "prestateTracer"})],
        ),
        transport.call::<Value>(
            "debug_traceTransaction",
            vec![
                json!(tx_hash),
                json!({"tracer": "prestateTracer", "tracerConfig": {"diffMode": true}}),
            ],
        ),
    )?;

    Ok(TxTrace {
        tx_hash,
        trace: diff,
        transaction: Some(transaction),
        receipt: Some(receipt),
        pre_state: Some(pre_state),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    /// Answers each method with a canned result and records every request.
    #[derive(Default)]
    pub(crate) struct MockTransport {
        pub(crate) answers: HashMap<&'static str, Value>,
        pub(crate) requests: Mutex<Vec<JsonRpcRequest>>,
        ids: AtomicU64,
    }

    impl MockTransport {
        pub(crate) fn with(answers: &[(&'static str, Value)]) -> Self {
            Self {
                answers: answers.iter().cloned().collect(),
                ..Default::default()
            }
        }

        pub(crate) fn methods(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.method.clone())
                .collect()
        }
    }

    #[async_trait]
    impl RpcTransport for MockTransport {
        async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, RpcError> {
            let answer = self.answers.get(req.method.as_str()).cloned();
            let resp = JsonRpcResponse {
                jsonrpc: "2.0".into(),
                id: req.id.clone(),
                error: answer.is_none().then(|| JsonRpcError {
                    code: -32601,
                    message: format!("the method {} does not exist", req.method),
                    data: None,
                }),
                result: answer,
            };
            self.requests.lock().unwrap().push(req);
            Ok(resp)
        }

        fn url(&self) -> &str {
            "mock://node"
        }

        fn next_id(&self) -> u64 {
            self.ids.fetch_add(1, Ordering::Relaxed)
        }
    }

    fn header(number: &str, txs: &[&str]) -> (&'static str, Value) {
        (
            "eth_getBlockByNumber",
            json!({"number": number, "hash": "0xbb", "transactions": txs}),
        )
    }

    #[tokio::test]
    async fn jerigon_uses_zero_tracer_and_witness() {
        let mock = MockTransport::with(&[
            header("0x10", &["0xaa"]),
            ("eth_chainId", json!("0x1")),
            (
                "debug_traceBlockByNumber",
                json!([{"txHash": "0xaa", "result": {"gas_used": 21000}}]),
            ),
            ("eth_getWitness", json!("0xdeadbeef")),
        ]);

        let trace = trace_block(&mock, &RpcFlavor::Jerigon, 16)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(trace.chain_id, "0x1");
        assert_eq!(trace.header["hash"], "0xbb");
        assert_eq!(trace.transactions.len(), 1);
        assert_eq!(trace.transactions[0].tx_hash, "0xaa");
        assert_eq!(trace.witness, Some(json!("0xdeadbeef")));
        assert_eq!(
            mock.methods(),
            vec![
                "eth_getBlockByNumber",
                "eth_chainId",
                "debug_traceBlockByNumber",
                "eth_getWitness"
            ]
        );
        let requests = mock.requests.lock().unwrap();
        assert_eq!(requests[0].params, vec![json!("0x10"), json!(false)]);
        assert_eq!(requests[2].params, vec![json!("0x10"), json!({"tracer": "zeroTracer"})]);
    }

    #[tokio::test]
    async fn native_traces_each_transaction() {
        let mock = MockTransport::with(&[
            header("0x5", &["0x01", "0x02"]),
            ("eth_chainId", json!("0x2a")),
            ("eth_getTransactionByHash", json!({"nonce": "0x0"})),
            ("eth_getTransactionReceipt", json!({"status": "0x1"})),
            ("debug_traceTransaction", json!({"pre": {}, "post": {}})),
        ]);

        let trace = trace_block(&mock, &RpcFlavor::Native, 5)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(trace.chain_id, "0x2a");
        assert_eq!(trace.header["number"], "0x5");
        assert_eq!(
            trace.transactions.iter().map(|t| t.tx_hash.as_str()).collect::<Vec<_>>(),
            vec!["0x01", "0x02"]
        );
        let tx = &trace.transactions[0];
        assert_eq!(tx.transaction, Some(json!({"nonce": "0x0"})));
        assert_eq!(tx.receipt, Some(json!({"status": "0x1"})));
        assert!(tx.pre_state.is_some());
        assert!(trace.witness.is_none());

        let per_tx = [
            "eth_getTransactionByHash",
            "eth_getTransactionReceipt",
            "debug_traceTransaction",
            "debug_traceTransaction",
        ];
        let mut expected = vec!["eth_getBlockByNumber", "eth_chainId"];
        expected.extend(per_tx);
        expected.extend(per_tx);
        assert_eq!(mock.methods(), expected);

        let requests = mock.requests.lock().unwrap();
        assert_eq!(requests[2].params, vec![json!("0x01")]);
        assert_eq!(requests[3].params, vec![json!("0x01")]);
        assert_eq!(requests[4].params[1], json!({"tracer": "prestateTracer"}));
        assert_eq!(requests[5].params[1]["tracer"], "prestateTracer");
        assert_eq!(requests[5].params[1]["tracerConfig"]["diffMode"], true);
        assert_eq!(requests[6].params, vec![json!("0x02")]);
    }

    #[tokio::test]
    async fn native_missing_block_is_an_error() {
        let mock = MockTransport::with(&[("eth_getBlockByNumber", Value::Null)]);
        let err = trace_block(&mock, &RpcFlavor::Native, 99).await.unwrap_err();
        assert!(matches!(err, RpcError::BlockNotFound(99)));
    }

    #[tokio::test]
    async fn unknown_flavor_makes_no_calls() {
        let mock = MockTransport::default();
        let trace = trace_block(&mock, &RpcFlavor::Other("zksync".into()), 1)
            .await
            .unwrap();
        assert!(trace.is_none());
        assert!(mock.methods().is_empty());
    }

    #[tokio::test]
    async fn node_error_surfaces_as_rpc_error() {
        let mock = MockTransport::with(&[header("0x1", &[]), ("eth_chainId", json!("0x1"))]);
        let err = trace_block(&mock, &RpcFlavor::Jerigon, 1).await.unwrap_err();
        assert!(matches!(err, RpcError::Rpc(ref e) if e.code == -32601), "{err:?}");
    }
}
