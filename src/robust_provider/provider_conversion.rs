use alloy::{
    network::{Ethereum, Network},
    providers::{
        DynProvider, Provider, RootProvider,
        fillers::{FillProvider, TxFiller},
        layers::{CacheProvider, CallBatchProvider},
    },
    transports::http::reqwest::Url,
};

use crate::{
    QueryFault,
    robust_provider::{RobustProvider, RobustProviderBuilder},
};

/// Anything [`RobustProviderBuilder`] accepts as a primary or fallback endpoint: a connected
/// provider, an Alloy provider wrapper, or an endpoint URL to connect to.
pub trait IntoRootProvider<N: Network = Ethereum> {
    /// Resolves the underlying [`RootProvider`], connecting first for URLs.
    ///
    /// # Errors
    ///
    /// Returns [`QueryFault::RpcError`] when the endpoint cannot be reached.
    fn into_root_provider(self) -> impl Future<Output = Result<RootProvider<N>, QueryFault>> + Send;
}

async fn connect<N: Network>(endpoint: &str) -> Result<RootProvider<N>, QueryFault> {
    debug!(endpoint = endpoint, "Connecting provider");
    RootProvider::connect(endpoint)
        .await
        .inspect_err(|e| error!(endpoint = endpoint, error = %e, "Failed to connect provider"))
        .map_err(QueryFault::from)
}

/// Root of a layered provider; the layers only affect calls made through the wrapper.
fn unwrap_layers<N: Network>(provider: &impl Provider<N>) -> RootProvider<N> {
    provider.root().clone()
}

impl<N: Network> IntoRootProvider<N> for RootProvider<N> {
    async fn into_root_provider(self) -> Result<RootProvider<N>, QueryFault> {
        Ok(self)
    }
}

/// Uses the primary only; the fallbacks of `self` are not carried over.
impl<N: Network> IntoRootProvider<N> for RobustProvider<N> {
    async fn into_root_provider(self) -> Result<RootProvider<N>, QueryFault> {
        Ok(self.primary_provider)
    }
}

impl<N: Network> IntoRootProvider<N> for &str {
    async fn into_root_provider(self) -> Result<RootProvider<N>, QueryFault> {
        connect(self).await
    }
}

impl<N: Network> IntoRootProvider<N> for String {
    async fn into_root_provider(self) -> Result<RootProvider<N>, QueryFault> {
        connect(&self).await
    }
}

impl<N: Network> IntoRootProvider<N> for Url {
    async fn into_root_provider(self) -> Result<RootProvider<N>, QueryFault> {
        connect(self.as_str()).await
    }
}

impl<F: TxFiller<N>, P: Provider<N>, N: Network> IntoRootProvider<N> for FillProvider<F, P, N> {
    async fn into_root_provider(self) -> Result<RootProvider<N>, QueryFault> {
        Ok(unwrap_layers(&self))
    }
}

impl<P: Provider<N>, N: Network> IntoRootProvider<N> for CacheProvider<P, N> {
    async fn into_root_provider(self) -> Result<RootProvider<N>, QueryFault> {
        Ok(unwrap_layers(&self))
    }
}

impl<P: Provider<N> + 'static, N: Network> IntoRootProvider<N> for CallBatchProvider<P, N> {
    async fn into_root_provider(self) -> Result<RootProvider<N>, QueryFault> {
        Ok(unwrap_layers(&self))
    }
}

impl<N: Network> IntoRootProvider<N> for DynProvider<N> {
    async fn into_root_provider(self) -> Result<RootProvider<N>, QueryFault> {
        Ok(unwrap_layers(&self))
    }
}

/// Shortcut for [`RobustProviderBuilder::new`] with every default.
pub trait IntoRobustProvider<N: Network = Ethereum> {
    /// # Errors
    ///
    /// Returns [`QueryFault::RpcError`] when the endpoint cannot be reached.
    fn into_robust_provider(
        self,
    ) -> impl Future<Output = Result<RobustProvider<N>, QueryFault>> + Send;
}

impl<N: Network, P: IntoRootProvider<N> + Send + 'static> IntoRobustProvider<N> for P {
    async fn into_robust_provider(self) -> Result<RobustProvider<N>, QueryFault> {
        RobustProviderBuilder::new(self).build().await
    }
}
