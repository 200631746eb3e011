//! Image asset download.

pub mod downloader;
pub mod fetcher;
pub mod filenames;

pub use downloader::{AssetDownloader, DownloaderConfig};
pub use fetcher::HttpAssetFetcher;
