//! Block explorer links
//!
//! Links carry the cluster as query parameters so the explorer opens in the
//! right context: nothing for mainnet, `?cluster=<network>` for the public
//! test networks and `?cluster=custom&customUrl=<endpoint>` otherwise.

use crate::cluster::{Cluster, ClusterNetwork};

/// Build the explorer URL for `path` (e.g. `tx/<signature>`) under `cluster`
pub fn build_explorer_url(base_url: &str, path: &str, cluster: &Cluster) -> String {
    let base = base_url.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{}/{}{}", base, path, cluster_params(cluster))
}

fn cluster_params(cluster: &Cluster) -> String {
    match cluster.network {
        Some(ClusterNetwork::Mainnet) => String::new(),
        Some(network @ (ClusterNetwork::Devnet | ClusterNetwork::Testnet)) => {
            format!("?cluster={}", network.as_str())
        }
        None => format!(
            "?cluster=custom&customUrl={}",
            urlencoding::encode(&cluster.endpoint)
        ),
    }
}
