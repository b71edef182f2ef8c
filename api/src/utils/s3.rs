//! Handles talking to the object store media bytes live in

use aws_credential_types::provider::SharedCredentialsProvider;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::{Client, config::Credentials};
use chrono::prelude::*;
use std::time::Duration;
use tracing::instrument;

use super::ApiError;
use crate::Conf;
use crate::conf::ObjectStore;

/// The s3 clients for each bucket clipforge uses
pub struct S3 {
    /// The s3 bucket uploads land in
    pub inputs: S3Client,
    /// The s3 bucket transcoded outputs are written to
    pub outputs: S3Client,
}

impl S3 {
    /// Build all of our s3 clients
    ///
    /// # Arguments
    ///
    /// * `config` - The clipforge config to use
    #[must_use]
    pub fn new(config: &Conf) -> Self {
        // build our clients
        let inputs = S3Client::new(&config.object_store.input_bucket, &config.object_store);
        let outputs = S3Client::new(&config.object_store.output_bucket, &config.object_store);
        S3 { inputs, outputs }
    }
}

/// A client scoped to one bucket in the object store
pub struct S3Client {
    /// The bucket this client reads and writes
    pub bucket: String,
    /// The account id used to build canonical urls
    account_id: String,
    /// The host used to build canonical urls
    host: String,
    /// The aws sdk s3 client
    pub client: Client,
}

impl S3Client {
    /// builds a new s3 client
    ///
    /// # Arguments
    ///
    /// * `bucket` - The bucket to scope this client to
    /// * `conf` - The object store settings
    #[must_use]
    pub fn new(bucket: &str, conf: &ObjectStore) -> Self {
        // get our s3 credentials
        let creds = Credentials::new(&conf.access_key, &conf.secret_token, None, None, "clipforge");
        // build our s3 config
        let s3_config = aws_sdk_s3::config::Builder::new()
            .endpoint_url(conf.endpoint())
            .region(aws_types::region::Region::new(conf.region.clone()))
            .credentials_provider(SharedCredentialsProvider::new(creds))
            .force_path_style(true)
            .build();
        // build our s3 client
        let client = Client::from_conf(s3_config);
        S3Client {
            bucket: bucket.to_owned(),
            account_id: conf.account_id.clone(),
            host: conf.host.clone(),
            client,
        }
    }

    /// Check if an object exists in this bucket by key
    ///
    /// # Arguments
    ///
    /// * `key` - The key to check against
    #[instrument(name = "S3Client::exists", skip(self), err(Debug))]
    pub async fn exists(&self, key: &str) -> Result<bool, ApiError> {
        // head this key to see if it exists
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(sdk_err) => match sdk_err.into_service_error() {
                HeadObjectError::NotFound(_) => Ok(false),
                err => Err(ApiError::from(err)),
            },
        }
    }

    /// Generate a presigned url a client can PUT an object to
    ///
    /// # Arguments
    ///
    /// * `key` - The key the upload will land at
    /// * `content_type` - The content type the upload will carry
    /// * `ttl` - How long the url should live in seconds
    #[instrument(name = "S3Client::presign_put", skip(self), err(Debug))]
    pub async fn presign_put(
        &self,
        key: &str,
        content_type: Option<&str>,
        ttl: u64,
    ) -> Result<(String, DateTime<Utc>), ApiError> {
        // build the presigning settings for this url
        let presigning = PresigningConfig::expires_in(Duration::from_secs(ttl))?;
        // build the put this url will authorize
        let mut put = self.client.put_object().bucket(&self.bucket).key(key);
        if let Some(content_type) = content_type {
            put = put.content_type(content_type);
        }
        // presign it
        let presigned = put.presigned(presigning).await?;
        let expires = Utc::now() + chrono::Duration::seconds(ttl as i64);
        Ok((presigned.uri().to_string(), expires))
    }

    /// Build the canonical public url for an object in this bucket
    ///
    /// # Arguments
    ///
    /// * `key` - The key the object lives at
    #[must_use]
    pub fn object_url(&self, key: &str) -> String {
        format!(
            "https://{}.{}/{}/{}",
            self.account_id, self.host, self.bucket, key
        )
    }
}
