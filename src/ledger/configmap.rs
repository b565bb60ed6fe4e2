//! Kubernetes ConfigMap ledger store
//!
//! Each store is one ConfigMap in the agent's namespace, named after the
//! store; keys map directly onto the ConfigMap's `data`.

use crate::domain::ports::KeyValueStore;
use crate::error::Result;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::Client;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Label marking ConfigMaps owned by the agent
pub const LEDGER_LABEL: &str = "storage.billyronks.io/ledger";

/// Key/value store persisted as Kubernetes ConfigMaps
pub struct ConfigMapStore {
    api: Api<ConfigMap>,
    namespace: String,
}

impl ConfigMapStore {
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            api: Api::namespaced(client, &namespace),
            namespace,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == 404)
}

#[async_trait]
impl KeyValueStore for ConfigMapStore {
    async fn get_value(&self, store: &str, key: &str) -> Result<Option<String>> {
        let cm = self.api.get_opt(store).await?;
        Ok(cm.and_then(|cm| cm.data).and_then(|mut data| data.remove(key)))
    }

    async fn set_value(&self, store: &str, key: &str, value: &str) -> Result<()> {
        if self.api.get_opt(store).await?.is_some() {
            let patch = serde_json::json!({ "data": { key: value } });
            self.api
                .patch(store, &PatchParams::default(), &Patch::Merge(&patch))
                .await?;
            debug!(configmap = store, key, "patched ledger configmap");
            return Ok(());
        }

        let cm = ConfigMap {
            metadata: ObjectMeta {
                name: Some(store.to_string()),
                namespace: Some(self.namespace.clone()),
                labels: Some(BTreeMap::from([(LEDGER_LABEL.to_string(), "true".to_string())])),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(key.to_string(), value.to_string())])),
            ..Default::default()
        };
        self.api.create(&PostParams::default(), &cm).await?;
        info!(configmap = store, namespace = %self.namespace, "created ledger configmap");
        Ok(())
    }

    async fn clear_store(&self, store: &str) -> Result<()> {
        match self.api.delete(store, &DeleteParams::default()).await {
            Ok(_) => {
                info!(configmap = store, namespace = %self.namespace, "deleted ledger configmap");
                Ok(())
            }
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn backend_name(&self) -> &str {
        "configmap"
    }
}
