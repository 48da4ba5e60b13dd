use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use flate2::read::GzDecoder;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::domain::GeoSeriesAccession;
use crate::error::GexError;

pub trait GeoClient: Send + Sync {
    fn fetch_soft_text(&self, accession: &GeoSeriesAccession) -> Result<String, GexError>;
    fn download_url(&self, url: &str, destination: &Path) -> Result<(), GexError>;
}

/// Series-level fields parsed out of a SOFT family record.
#[derive(Debug, Clone, Default)]
pub struct SoftRecord {
    pub supplementary_urls: Vec<String>,
    pub organism: Option<String>,
}

#[derive(Clone)]
pub struct GeoHttpClient {
    client: Client,
}

impl GeoHttpClient {
    pub fn new() -> Result<Self, GexError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("gexfetch/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| GexError::Filesystem(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| GexError::GeoHttp(err.to_string()))?;
        Ok(Self { client })
    }

    fn soft_url(accession: &GeoSeriesAccession) -> String {
        let prefix = geo_series_prefix(accession);
        format!(
            "https://ftp.ncbi.nlm.nih.gov/geo/series/{prefix}/{acc}/soft/{acc}_family.soft.gz",
            acc = accession.as_str()
        )
    }

    fn normalize_url(url: &str) -> String {
        if let Some(rest) = url.strip_prefix("ftp://ftp.ncbi.nlm.nih.gov/") {
            return format!("https://ftp.ncbi.nlm.nih.gov/{}", rest);
        }
        url.to_string()
    }
}

impl GeoClient for GeoHttpClient {
    fn fetch_soft_text(&self, accession: &GeoSeriesAccession) -> Result<String, GexError> {
        let url = Self::soft_url(accession);
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| GexError::GeoHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "GEO request failed".to_string());
            return Err(GexError::GeoStatus { status, message });
        }
        let bytes = response
            .bytes()
            .map_err(|err| GexError::GeoHttp(err.to_string()))?;
        let mut decoder = GzDecoder::new(bytes.as_ref());
        let mut text = String::new();
        decoder
            .read_to_string(&mut text)
            .map_err(|err| GexError::GeoHttp(err.to_string()))?;
        Ok(text)
    }

    fn download_url(&self, url: &str, destination: &Path) -> Result<(), GexError> {
        let url = Self::normalize_url(url);
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|err| GexError::GeoHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "GEO request failed".to_string());
            return Err(GexError::GeoStatus { status, message });
        }
        let mut file =
            File::create(destination).map_err(|err| GexError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, &mut file)
            .map_err(|err| GexError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

pub fn parse_soft(soft_text: &str) -> SoftRecord {
    let mut record = SoftRecord::default();
    for line in soft_text.lines() {
        if line.contains("supplementary_file") {
            if let Some((_, value)) = line.split_once('=') {
                let url = value.trim();
                if !url.is_empty() {
                    record.supplementary_urls.push(url.to_string());
                }
            }
            continue;
        }
        if record.organism.is_none()
            && (line.starts_with("!Series_organism")
                || line.starts_with("!Sample_organism_ch1"))
        {
            if let Some((_, value)) = line.split_once('=') {
                let value = value.trim();
                if !value.is_empty() {
                    record.organism = Some(value.to_string());
                }
            }
        }
    }
    record
}

/// GEO shards series directories by accession prefix: GSE164073 lives
/// under GSE164nnn.
pub fn geo_series_prefix(accession: &GeoSeriesAccession) -> String {
    let digits = accession.as_str().trim_start_matches("GSE");
    if digits.len() <= 3 {
        return "GSEnnn".to_string();
    }
    let head = &digits[..digits.len() - 3];
    format!("GSE{}nnn", head)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_soft_collects_urls_and_organism() {
        let soft = "\
^SERIES = GSE164073
!Series_organism_ch1 = Homo sapiens
!Series_supplementary_file = ftp://ftp.ncbi.nlm.nih.gov/geo/series/GSE164nnn/GSE164073/suppl/GSE164073_matrix.mtx.gz
!Sample_supplementary_file_1 = ftp://ftp.ncbi.nlm.nih.gov/geo/series/GSE164nnn/GSE164073/suppl/GSE164073_barcodes.tsv.gz
";
        let record = parse_soft(soft);
        assert_eq!(record.supplementary_urls.len(), 2);
        assert_eq!(record.organism.as_deref(), Some("Homo sapiens"));
    }

    #[test]
    fn series_prefix_shards_last_three_digits() {
        let acc: GeoSeriesAccession = "GSE164073".parse().unwrap();
        assert_eq!(geo_series_prefix(&acc), "GSE164nnn");
        let acc: GeoSeriesAccession = "GSE99".parse().unwrap();
        assert_eq!(geo_series_prefix(&acc), "GSEnnn");
    }
}
