//! In-memory [`LocalStore`] and [`RegistryApi`] implementations for tests

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::jsonapi::{
    Document, LocalStore, LocalStoreError, PrimaryData, QueryParams, RequestContext, Resource,
};
use crate::location::Vereniging;
use crate::mapping::AttributeMap;
use crate::registry::{RegistryApi, RegistryError, VerenigingSnapshot, WriteReceipt};
use crate::resolver::{VCode, ASSOCIATIONS};

/// Local store keeping resources in a map; `associations` list calls return
/// a canned document
#[derive(Default)]
pub struct MemoryStore {
    associations: Mutex<Value>,
    resources: Mutex<HashMap<(String, String), AttributeMap>>,
    list_params: Mutex<Vec<QueryParams>>,
    written: Mutex<bool>,
    fail_writes: Mutex<bool>,
}

impl MemoryStore {
    pub fn set_associations(&self, document: Value) {
        *self.associations.lock() = document;
    }

    pub fn put(&self, kind: &str, id: &str, attributes: AttributeMap) {
        self.resources
            .lock()
            .insert((kind.to_string(), id.to_string()), attributes);
    }

    pub fn attributes(&self, kind: &str, id: &str) -> Option<AttributeMap> {
        self.resources
            .lock()
            .get(&(kind.to_string(), id.to_string()))
            .cloned()
    }

    pub fn fail_writes(&self) {
        *self.fail_writes.lock() = true;
    }

    pub fn was_written(&self) -> bool {
        *self.written.lock()
    }

    pub fn list_calls(&self) -> usize {
        self.list_params.lock().len()
    }

    pub fn last_list_params(&self) -> Option<QueryParams> {
        self.list_params.lock().last().cloned()
    }

    fn check_writable(&self) -> Result<(), LocalStoreError> {
        if *self.fail_writes.lock() {
            return Err(LocalStoreError::Status {
                status: 500,
                body: "write refused".to_string(),
            });
        }
        *self.written.lock() = true;
        Ok(())
    }
}

fn not_found() -> LocalStoreError {
    LocalStoreError::Status {
        status: 404,
        body: String::new(),
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn list(
        &self,
        resource: &str,
        params: &QueryParams,
        _ctx: &RequestContext,
    ) -> Result<Document, LocalStoreError> {
        self.list_params.lock().push(params.clone());
        if resource != ASSOCIATIONS {
            return Ok(Document::default());
        }
        let document = self.associations.lock().clone();
        if document.is_null() {
            return Ok(Document::default());
        }
        serde_json::from_value(document).map_err(|e| LocalStoreError::InvalidResponse(e.to_string()))
    }

    async fn get(
        &self,
        resource: &str,
        id: &str,
        _params: &QueryParams,
        _ctx: &RequestContext,
    ) -> Result<Document, LocalStoreError> {
        let attributes = self.attributes(resource, id).ok_or_else(not_found)?;
        Ok(Document {
            data: Some(PrimaryData::One(Box::new(Resource {
                kind: resource.to_string(),
                id: Some(id.to_string()),
                attributes,
                relationships: Default::default(),
            }))),
            included: Vec::new(),
        })
    }

    async fn update(
        &self,
        resource: &str,
        id: &str,
        attributes: AttributeMap,
        _ctx: &RequestContext,
    ) -> Result<Option<Document>, LocalStoreError> {
        self.check_writable()?;
        let mut resources = self.resources.lock();
        let existing = resources
            .get_mut(&(resource.to_string(), id.to_string()))
            .ok_or_else(not_found)?;
        existing.extend(attributes);
        Ok(None)
    }

    async fn delete(
        &self,
        resource: &str,
        id: &str,
        _ctx: &RequestContext,
    ) -> Result<(), LocalStoreError> {
        self.check_writable()?;
        self.resources
            .lock()
            .remove(&(resource.to_string(), id.to_string()))
            .map(|_| ())
            .ok_or_else(not_found)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegistryCall {
    Get {
        vcode: String,
    },
    UpdateLocatie {
        vcode: String,
        locatie_id: String,
        body: Value,
        etag: String,
    },
    UpdateMaatschappelijkeZetel {
        vcode: String,
        locatie_id: String,
        body: Value,
        etag: String,
    },
    DeleteLocatie {
        vcode: String,
        locatie_id: String,
        etag: String,
    },
}

/// Registry serving one vereniging and recording every call
pub struct FakeRegistry {
    snapshot: VerenigingSnapshot,
    calls: Mutex<Vec<RegistryCall>>,
    fail_next_write: Mutex<Option<u16>>,
}

impl FakeRegistry {
    pub fn with_vereniging(vereniging: Value, etag: &str) -> Self {
        let parsed: Vereniging = serde_json::from_value(vereniging.clone())
            .unwrap_or_else(|e| panic!("invalid vereniging fixture: {e}"));
        Self {
            snapshot: VerenigingSnapshot {
                vereniging: parsed,
                etag: etag.to_string(),
                body: serde_json::json!({ "vereniging": vereniging }),
            },
            calls: Mutex::new(Vec::new()),
            fail_next_write: Mutex::new(None),
        }
    }

    /// Make the next write answer with this HTTP status
    pub fn fail_next_write(&self, status: u16) {
        *self.fail_next_write.lock() = Some(status);
    }

    pub fn calls(&self) -> Vec<RegistryCall> {
        self.calls.lock().clone()
    }

    pub fn writes(&self) -> Vec<RegistryCall> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, RegistryCall::Get { .. }))
            .collect()
    }

    fn record_write(&self, call: RegistryCall) -> Result<WriteReceipt, RegistryError> {
        self.calls.lock().push(call);
        match self.fail_next_write.lock().take() {
            Some(status @ (409 | 412)) => Err(RegistryError::ConcurrencyConflict { status }),
            Some(status) => Err(RegistryError::RemoteWrite {
                what: "fake".to_string(),
                status,
                body: String::new(),
            }),
            None => Ok(WriteReceipt {
                etag: Some("W/\"8\"".to_string()),
                sequence: Some(8),
            }),
        }
    }
}

#[async_trait]
impl RegistryApi for FakeRegistry {
    async fn get_vereniging(&self, vcode: &VCode) -> Result<VerenigingSnapshot, RegistryError> {
        self.calls.lock().push(RegistryCall::Get {
            vcode: vcode.to_string(),
        });
        Ok(self.snapshot.clone())
    }

    async fn update_locatie(
        &self,
        vcode: &VCode,
        locatie_id: &str,
        adres: &AttributeMap,
        etag: &str,
    ) -> Result<WriteReceipt, RegistryError> {
        self.record_write(RegistryCall::UpdateLocatie {
            vcode: vcode.to_string(),
            locatie_id: locatie_id.to_string(),
            body: Value::Object(adres.clone()),
            etag: etag.to_string(),
        })
    }

    async fn update_maatschappelijke_zetel(
        &self,
        vcode: &VCode,
        locatie_id: &str,
        locatie: &Value,
        etag: &str,
    ) -> Result<WriteReceipt, RegistryError> {
        self.record_write(RegistryCall::UpdateMaatschappelijkeZetel {
            vcode: vcode.to_string(),
            locatie_id: locatie_id.to_string(),
            body: locatie.clone(),
            etag: etag.to_string(),
        })
    }

    async fn delete_locatie(
        &self,
        vcode: &VCode,
        locatie_id: &str,
        etag: &str,
    ) -> Result<WriteReceipt, RegistryError> {
        self.record_write(RegistryCall::DeleteLocatie {
            vcode: vcode.to_string(),
            locatie_id: locatie_id.to_string(),
            etag: etag.to_string(),
        })
    }
}
