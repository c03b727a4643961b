pub mod documents;
pub mod health;
pub mod upload_url;
