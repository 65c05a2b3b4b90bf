pub mod blob_store;
pub mod content_type;
pub mod s3_store;
pub mod storage_service;
pub mod url_signer;

#[cfg(test)]
pub(crate) mod mock_store;
