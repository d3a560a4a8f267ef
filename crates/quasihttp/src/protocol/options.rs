use std::collections::HashMap;

/// Hard default for the maximum chunk / headers-block size.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 8 * 1024;

/// Hard default for the response body buffering size limit.
pub const DEFAULT_RESPONSE_BODY_BUFFERING_SIZE_LIMIT: u64 = 128 * 1024 * 1024;

/// Per-call send options; every field left unset falls back to the client-wide
/// defaults and then to the hard defaults.
///
/// A `timeout_millis` of zero or below disables the send timeout; the same
/// sentinel applies uniformly wherever a timeout is configured.
#[derive(Debug, Clone, Default)]
pub struct QuasiHttpSendOptions {
    pub timeout_millis: Option<i64>,
    pub max_chunk_size: Option<usize>,
    pub response_buffering_enabled: Option<bool>,
    pub response_body_buffering_size_limit: Option<u64>,
    /// Extra parameters handed unmodified to the transport.
    pub extra_connectivity_params: HashMap<String, String>,
}

/// The fully resolved options a single transfer runs with.
#[derive(Debug, Clone)]
pub struct EffectiveSendOptions {
    pub timeout_millis: i64,
    pub max_chunk_size: usize,
    pub response_buffering_enabled: bool,
    pub response_body_buffering_size_limit: u64,
    pub extra_connectivity_params: HashMap<String, String>,
}

impl EffectiveSendOptions {
    /// Merges explicit call options over client-wide defaults over hard
    /// defaults. Call-level extra connectivity params override same-named
    /// client-level ones.
    pub fn merge(call: Option<&QuasiHttpSendOptions>, defaults: &QuasiHttpSendOptions) -> Self {
        let timeout_millis = call
            .and_then(|o| o.timeout_millis)
            .or(defaults.timeout_millis)
            .unwrap_or(0);
        let max_chunk_size = call
            .and_then(|o| o.max_chunk_size)
            .or(defaults.max_chunk_size)
            .unwrap_or(DEFAULT_MAX_CHUNK_SIZE);
        let response_buffering_enabled = call
            .and_then(|o| o.response_buffering_enabled)
            .or(defaults.response_buffering_enabled)
            .unwrap_or(true);
        let response_body_buffering_size_limit = call
            .and_then(|o| o.response_body_buffering_size_limit)
            .or(defaults.response_body_buffering_size_limit)
            .unwrap_or(DEFAULT_RESPONSE_BODY_BUFFERING_SIZE_LIMIT);

        let mut extra_connectivity_params = defaults.extra_connectivity_params.clone();
        if let Some(call) = call {
            for (k, v) in &call.extra_connectivity_params {
                extra_connectivity_params.insert(k.clone(), v.clone());
            }
        }

        Self {
            timeout_millis,
            max_chunk_size: max_chunk_size.max(1),
            response_buffering_enabled,
            response_body_buffering_size_limit,
            extra_connectivity_params,
        }
    }

    /// Whether a timeout timer should be armed at all.
    #[inline]
    pub fn timeout_enabled(&self) -> bool {
        self.timeout_millis > 0
    }
}
