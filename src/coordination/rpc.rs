// # Outbound RPCs (External Collaborator, Sketched)
//
// The wire transport and connection cache are out of scope; this module
// defines the payload shapes `BackendState` builds and the trait it calls
// through, plus a loopback double used by tests to script failures.

use crate::coordination::exec_params::{DebugOptions, PlanNode};
use crate::coordination::types::{FragmentIdx, InstanceId, QueryId};
use crate::error::DbError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const PROTOCOL_VERSION: i32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentCtx {
    pub fragment_idx: FragmentIdx,
    pub plan_nodes: Vec<PlanNode>,
    pub destinations: Vec<SocketAddr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceCtx {
    pub fragment_idx: FragmentIdx,
    pub instance_id: InstanceId,
    pub per_fragment_instance_idx: usize,
    pub per_node_scan_ranges: HashMap<i32, Vec<u64>>,
    pub per_exch_num_senders: HashMap<i32, i32>,
    pub sender_id: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_options: Option<DebugOptions>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartQueryRequest {
    pub protocol_version: i32,
    pub coord_state_idx: usize,
    pub min_mem_reservation_bytes: i64,
    pub initial_mem_reservation_total_claims: i64,
    pub fragment_ctxs: Vec<FragmentCtx>,
    pub instance_ctxs: Vec<InstanceCtx>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartQueryResponse {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelQueryRequest {
    pub protocol_version: i32,
    pub query_id: QueryId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelQueryResponse {
    /// Ignored by the caller: the backend may have already forgotten the
    /// query locally, which is not itself a failure.
    pub instance_not_found: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishFilterRequest {
    pub dst_query_id: QueryId,
    pub dst_fragment_idx: FragmentIdx,
    pub filter_id: u32,
    pub payload: Vec<u8>,
}

/// The connection-cache-backed client a real coordinator would use. Only the
/// call shapes are specified here; the transport is out of scope.
#[async_trait]
pub trait BackendClient: Send + Sync {
    async fn start_query(
        &self,
        host: SocketAddr,
        req: StartQueryRequest,
    ) -> Result<StartQueryResponse, DbError>;

    async fn cancel_query(
        &self,
        host: SocketAddr,
        req: CancelQueryRequest,
    ) -> Result<CancelQueryResponse, DbError>;

    async fn publish_filter(
        &self,
        host: SocketAddr,
        req: PublishFilterRequest,
    ) -> Result<(), DbError>;
}

/// A backend client double: all calls succeed unless scripted to fail a
/// fixed number of times first. Used to exercise the "Exec RPC fails" and
/// "Cancel retries" scenarios without a real socket.
#[derive(Debug, Default)]
pub struct LoopbackBackendClient {
    start_query_failures: AtomicUsize,
    cancel_query_failures: AtomicUsize,
    publish_filter_failures: AtomicUsize,
}

impl LoopbackBackendClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_start_query(self, times: usize) -> Self {
        self.start_query_failures.store(times, Ordering::SeqCst);
        self
    }

    pub fn fail_cancel_query(self, times: usize) -> Self {
        self.cancel_query_failures.store(times, Ordering::SeqCst);
        self
    }

    pub fn fail_publish_filter(self, times: usize) -> Self {
        self.publish_filter_failures.store(times, Ordering::SeqCst);
        self
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        let mut cur = counter.load(Ordering::SeqCst);
        while cur > 0 {
            match counter.compare_exchange_weak(cur, cur - 1, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => return true,
                Err(observed) => cur = observed,
            }
        }
        false
    }
}

#[async_trait]
impl BackendClient for LoopbackBackendClient {
    async fn start_query(
        &self,
        _host: SocketAddr,
        _req: StartQueryRequest,
    ) -> Result<StartQueryResponse, DbError> {
        if Self::take_failure(&self.start_query_failures) {
            return Err(DbError::Network("connection refused".to_string()));
        }
        Ok(StartQueryResponse {
            ok: true,
            message: String::new(),
        })
    }

    async fn cancel_query(
        &self,
        _host: SocketAddr,
        _req: CancelQueryRequest,
    ) -> Result<CancelQueryResponse, DbError> {
        if Self::take_failure(&self.cancel_query_failures) {
            return Err(DbError::Network("connection reset".to_string()));
        }
        Ok(CancelQueryResponse {
            instance_not_found: false,
        })
    }

    async fn publish_filter(
        &self,
        _host: SocketAddr,
        _req: PublishFilterRequest,
    ) -> Result<(), DbError> {
        if Self::take_failure(&self.publish_filter_failures) {
            return Err(DbError::Network("publish filter failed".to_string()));
        }
        Ok(())
    }
}
