//! Backend DynamoDB
//!
//! Écriture via `BatchWriteItem` (25 éléments max), administration via
//! `DescribeTable`, `UpdateTable` et `Scan`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_dynamodb::config::timeout::TimeoutConfig;
use aws_sdk_dynamodb::error::{DisplayErrorContext, SdkError};
use aws_sdk_dynamodb::operation::batch_write_item::BatchWriteItemError;
use aws_sdk_dynamodb::operation::describe_table::DescribeTableError;
use aws_sdk_dynamodb::operation::scan::ScanError;
use aws_sdk_dynamodb::operation::update_table::UpdateTableError;
use aws_sdk_dynamodb::types::{
    AttributeValue, DeleteRequest, ProvisionedThroughput, PutRequest, WriteRequest,
};
use aws_sdk_dynamodb::Client;
use tracing::{debug, info, warn};

use super::{RecordStore, StoreError, StoreLifecycle, TableStatus};
use crate::config::{RetryPolicy, DEFAULT_TABLE_NAME, MAX_BATCH_SIZE};
use crate::record::{Item, ItemValue};

type Attributes = HashMap<String, AttributeValue>;

/// Paramètres de connexion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamoDbConfig {
    /// Table cible
    pub table_name: String,
    /// Région AWS (défaut du SDK sinon)
    pub region: Option<String>,
    /// Endpoint alternatif (LocalStack)
    pub endpoint: Option<String>,
    /// Délai maximal d'une opération, en millisecondes
    pub timeout_ms: Option<u64>,
}

impl Default for DynamoDbConfig {
    fn default() -> Self {
        Self {
            table_name: DEFAULT_TABLE_NAME.to_string(),
            region: None,
            endpoint: None,
            timeout_ms: None,
        }
    }
}

impl DynamoDbConfig {
    /// Lit `AHUPUAA_TABLE`, `AWS_REGION`, `AWS_ENDPOINT_URL` et
    /// `AHUPUAA_TIMEOUT_MS`
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            table_name: var("AHUPUAA_TABLE").unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string()),
            region: var("AWS_REGION"),
            endpoint: var("AWS_ENDPOINT_URL"),
            timeout_ms: var("AHUPUAA_TIMEOUT_MS").and_then(|v| v.parse().ok()),
        }
    }

    pub fn with_table(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }
}

/// Table DynamoDB
#[derive(Clone)]
pub struct DynamoDbStore {
    client: Client,
    table_name: String,
}

impl std::fmt::Debug for DynamoDbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoDbStore")
            .field("table_name", &self.table_name)
            .finish()
    }
}

impl DynamoDbStore {
    /// Construit le client à partir de la configuration AWS par défaut
    pub async fn connect(config: DynamoDbConfig) -> Self {
        let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(&sdk_config, config)
    }

    /// Construit le client en héritant de `sdk_config`
    pub fn new(sdk_config: &aws_config::SdkConfig, config: DynamoDbConfig) -> Self {
        let mut builder = aws_sdk_dynamodb::config::Builder::from(sdk_config);

        if let Some(region) = config.region {
            builder = builder.region(aws_sdk_dynamodb::config::Region::new(region));
        }

        if let Some(endpoint) = config.endpoint {
            info!(endpoint = %endpoint, "Using custom DynamoDB endpoint");
            builder = builder.endpoint_url(endpoint);
        }

        if let Some(timeout_ms) = config.timeout_ms {
            let timeout_config = TimeoutConfig::builder()
                .operation_timeout(Duration::from_millis(timeout_ms))
                .build();
            builder = builder.timeout_config(timeout_config);
        }

        Self {
            client: Client::from_conf(builder.build()),
            table_name: config.table_name,
        }
    }

    pub fn from_client(client: Client, table_name: String) -> Self {
        Self { client, table_name }
    }

    /// Noms des attributs de clé de la table (partition puis tri)
    async fn key_attributes(&self) -> Result<Vec<String>, StoreError> {
        let output = self
            .client
            .describe_table()
            .table_name(&self.table_name)
            .send()
            .await
            .map_err(describe_error)?;

        let keys: Vec<String> = output
            .table()
            .map(|table| {
                table
                    .key_schema()
                    .iter()
                    .map(|element| element.attribute_name().to_string())
                    .collect()
            })
            .unwrap_or_default();

        if keys.is_empty() {
            return Err(StoreError::InvalidRequest(format!(
                "no key schema for table {}",
                self.table_name
            )));
        }
        Ok(keys)
    }

    /// Lit une page de clés à partir de `start_key`
    ///
    /// Retourne les clés de la page et la clé de reprise de la page suivante.
    async fn scan_page(
        &self,
        key_names: &[String],
        start_key: Option<Attributes>,
    ) -> Result<(Vec<Attributes>, Option<Attributes>), StoreError> {
        let projection = (0..key_names.len())
            .map(|i| format!("#k{}", i))
            .collect::<Vec<_>>()
            .join(", ");

        let mut request = self
            .client
            .scan()
            .table_name(&self.table_name)
            .projection_expression(projection);
        for (i, name) in key_names.iter().enumerate() {
            request = request.expression_attribute_names(format!("#k{}", i), name);
        }

        let response = request
            .set_exclusive_start_key(start_key)
            .send()
            .await
            .map_err(scan_error)?;
        let next = response
            .last_evaluated_key()
            .filter(|key| !key.is_empty())
            .cloned();
        Ok((response.items().to_vec(), next))
    }

    /// Supprime un groupe de clés, en reprenant les suppressions non traitées
    async fn delete_keys(&self, keys: Vec<Attributes>) -> Result<usize, StoreError> {
        let total = keys.len();
        let retry = RetryPolicy::default();
        let mut pending = keys;
        let mut retries = 0;

        while !pending.is_empty() {
            let requests = pending
                .iter()
                .map(|key| {
                    let delete = DeleteRequest::builder()
                        .set_key(Some(key.clone()))
                        .build()
                        .map_err(|e| StoreError::InvalidRequest(e.to_string()))?;
                    Ok(WriteRequest::builder().delete_request(delete).build())
                })
                .collect::<Result<Vec<_>, StoreError>>()?;

            let output = self
                .client
                .batch_write_item()
                .request_items(&self.table_name, requests)
                .send()
                .await
                .map_err(batch_write_error)?;

            pending = output
                .unprocessed_items()
                .and_then(|tables| tables.get(&self.table_name))
                .map(|requests| {
                    requests
                        .iter()
                        .filter_map(|r| r.delete_request())
                        .map(|d| d.key().clone())
                        .collect()
                })
                .unwrap_or_default();

            if !pending.is_empty() {
                retries += 1;
                if retries >= retry.max_retries {
                    return Err(StoreError::Throttled(format!(
                        "{} deletions still unprocessed after {} attempts",
                        pending.len(),
                        retries
                    )));
                }
                tokio::time::sleep(retry.partial_backoff(retries)).await;
            }
        }

        Ok(total)
    }
}

#[async_trait]
impl RecordStore for DynamoDbStore {
    async fn put_batch(&self, items: &[Item]) -> Result<Vec<Item>, StoreError> {
        let requests = items
            .iter()
            .map(|item| {
                let put = PutRequest::builder()
                    .set_item(Some(to_attributes(item)))
                    .build()
                    .map_err(|e| StoreError::InvalidRequest(e.to_string()))?;
                Ok(WriteRequest::builder().put_request(put).build())
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        let output = self
            .client
            .batch_write_item()
            .request_items(&self.table_name, requests)
            .send()
            .await
            .map_err(batch_write_error)?;

        let unprocessed = output
            .unprocessed_items()
            .and_then(|tables| tables.get(&self.table_name))
            .map(|requests| {
                requests
                    .iter()
                    .filter_map(|r| r.put_request())
                    .map(|put| from_attributes(put.item()))
                    .collect()
            })
            .unwrap_or_default();

        Ok(unprocessed)
    }
}

#[async_trait]
impl StoreLifecycle for DynamoDbStore {
    fn table_name(&self) -> &str {
        &self.table_name
    }

    async fn table_status(&self) -> Result<TableStatus, StoreError> {
        let result = self
            .client
            .describe_table()
            .table_name(&self.table_name)
            .send()
            .await;

        match result {
            Ok(output) => {
                let status = output
                    .table()
                    .and_then(|table| table.table_status())
                    .map(|status| status.as_str().to_string())
                    .unwrap_or_default();
                if status == "ACTIVE" {
                    Ok(TableStatus::Active)
                } else {
                    Ok(TableStatus::Pending(status))
                }
            }
            Err(SdkError::ServiceError(service_err))
                if matches!(
                    service_err.err(),
                    DescribeTableError::ResourceNotFoundException(_)
                ) =>
            {
                Ok(TableStatus::Missing)
            }
            Err(err) => Err(describe_error(err)),
        }
    }

    async fn set_throughput(&self, read: i64, write: i64) -> Result<(), StoreError> {
        let throughput = ProvisionedThroughput::builder()
            .read_capacity_units(read)
            .write_capacity_units(write)
            .build()
            .map_err(|e| StoreError::InvalidRequest(e.to_string()))?;

        self.client
            .update_table()
            .table_name(&self.table_name)
            .provisioned_throughput(throughput)
            .send()
            .await
            .map_err(update_error)?;

        info!(table = %self.table_name, read, write, "Provisioned throughput updated");
        Ok(())
    }

    async fn delete_all(&self, confirm: bool) -> Result<usize, StoreError> {
        if !confirm {
            warn!(table = %self.table_name, "Deletion not confirmed, nothing deleted");
            return Ok(0);
        }

        let key_names = self.key_attributes().await?;
        info!(table = %self.table_name, "Deleting all records");

        // Chaque page est supprimée avant de lire la suivante
        let mut deleted = 0;
        let mut start_key = None;
        loop {
            let (page, next) = self.scan_page(&key_names, start_key).await?;
            for chunk in key_chunks(page, MAX_BATCH_SIZE) {
                deleted += self.delete_keys(chunk).await?;
            }
            debug!(deleted, "Deleted records");

            match next {
                Some(key) => start_key = Some(key),
                None => break,
            }
        }

        info!(table = %self.table_name, deleted, "Table wiped");
        Ok(deleted)
    }
}

/// Découpe une page de clés en groupes d'au plus `size`
fn key_chunks(keys: Vec<Attributes>, size: usize) -> Vec<Vec<Attributes>> {
    let mut chunks = Vec::with_capacity(keys.len().div_ceil(size));
    let mut keys = keys.into_iter().peekable();
    while keys.peek().is_some() {
        chunks.push(keys.by_ref().take(size).collect());
    }
    chunks
}

/// Convertit une valeur étiquetée en `AttributeValue`
pub fn to_attribute(value: &ItemValue) -> AttributeValue {
    match value {
        ItemValue::S(s) => AttributeValue::S(s.clone()),
        ItemValue::N(n) => AttributeValue::N(n.clone()),
        ItemValue::Bool(b) => AttributeValue::Bool(*b),
        ItemValue::Null => AttributeValue::Null(true),
        ItemValue::M(map) => AttributeValue::M(
            map.iter()
                .map(|(k, v)| (k.clone(), to_attribute(v)))
                .collect(),
        ),
    }
}

/// Convertit une `AttributeValue` lue dans la table
///
/// Les types non produits par l'import (listes, ensembles, binaire) sont
/// ignorés.
pub fn from_attribute(value: &AttributeValue) -> Option<ItemValue> {
    match value {
        AttributeValue::S(s) => Some(ItemValue::S(s.clone())),
        AttributeValue::N(n) => Some(ItemValue::N(n.clone())),
        AttributeValue::Bool(b) => Some(ItemValue::Bool(*b)),
        AttributeValue::Null(_) => Some(ItemValue::Null),
        AttributeValue::M(map) => Some(ItemValue::M(
            map.iter()
                .filter_map(|(k, v)| Some((k.clone(), from_attribute(v)?)))
                .collect(),
        )),
        _ => None,
    }
}

pub fn to_attributes(item: &Item) -> Attributes {
    item.attributes()
        .iter()
        .map(|(name, value)| (name.clone(), to_attribute(value)))
        .collect()
}

pub fn from_attributes(attributes: &Attributes) -> Item {
    attributes
        .iter()
        .filter_map(|(name, value)| Some((name.clone(), from_attribute(value)?)))
        .collect()
}

fn batch_write_error<R>(err: SdkError<BatchWriteItemError, R>) -> StoreError
where
    R: std::fmt::Debug,
{
    let message = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::ServiceError(service_err) => match service_err.err() {
            BatchWriteItemError::ProvisionedThroughputExceededException(_)
            | BatchWriteItemError::RequestLimitExceeded(_) => StoreError::Throttled(message),
            BatchWriteItemError::ResourceNotFoundException(_) => StoreError::NotFound(message),
            _ => StoreError::Service(message),
        },
        _ => StoreError::Service(message),
    }
}

fn describe_error<R>(err: SdkError<DescribeTableError, R>) -> StoreError
where
    R: std::fmt::Debug,
{
    let message = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::ServiceError(service_err)
            if matches!(
                service_err.err(),
                DescribeTableError::ResourceNotFoundException(_)
            ) =>
        {
            StoreError::NotFound(message)
        }
        _ => StoreError::Service(message),
    }
}

fn scan_error<R>(err: SdkError<ScanError, R>) -> StoreError
where
    R: std::fmt::Debug,
{
    let message = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::ServiceError(service_err) => match service_err.err() {
            ScanError::ProvisionedThroughputExceededException(_)
            | ScanError::RequestLimitExceeded(_) => StoreError::Throttled(message),
            ScanError::ResourceNotFoundException(_) => StoreError::NotFound(message),
            _ => StoreError::Service(message),
        },
        _ => StoreError::Service(message),
    }
}

fn update_error<R>(err: SdkError<UpdateTableError, R>) -> StoreError
where
    R: std::fmt::Debug,
{
    let message = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::ServiceError(service_err) => match service_err.err() {
            UpdateTableError::ResourceNotFoundException(_) => StoreError::NotFound(message),
            UpdateTableError::LimitExceededException(_) => StoreError::Throttled(message),
            _ => StoreError::InvalidRequest(message),
        },
        _ => StoreError::Service(message),
    }
}
