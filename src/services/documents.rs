//! Plain-text invoice rendering and local document storage.
//!
//! Documents live under `{invoice_document_dir}/{payer_id}/{number}.txt`
//! with the slashes of the invoice number flattened to underscores. A
//! document is written exactly once; a second write for the same number is
//! an error rather than an overwrite.

use crate::{
    common::{round2, split_vat},
    config::AppConfig,
    errors::ServiceError,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

const RULE_WIDTH: usize = 72;

/// Seller identity printed on every invoice, sourced from configuration.
#[derive(Debug, Clone)]
pub struct SellerInfo {
    pub name: String,
    pub address: String,
    pub nip: String,
}

impl SellerInfo {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            name: cfg.seller_name.clone(),
            address: cfg.seller_address.clone(),
            nip: cfg.seller_nip.clone(),
        }
    }
}

/// Buyer details as captured on the invoice request.
#[derive(Debug, Clone)]
pub struct BillingDetails {
    pub name: String,
    pub address: String,
    pub postal_code: String,
    pub city: String,
    pub nip: Option<String>,
}

/// One invoice line. `gross` is taken from the payment record; lines
/// without an amount fall back to an even split of the invoice total.
#[derive(Debug, Clone)]
pub struct InvoiceLine {
    pub title: String,
    pub gross: Option<Decimal>,
}

/// Splits a total evenly across `count` lines, last line absorbing the
/// rounding remainder so the parts always sum back to the total.
pub fn split_evenly(total: Decimal, count: usize) -> Vec<Decimal> {
    if count == 0 {
        return Vec::new();
    }
    let base = round2(total / Decimal::from(count as i64));
    let mut parts = vec![base; count];
    parts[count - 1] = total - base * Decimal::from(count as i64 - 1);
    parts
}

fn fmt_amount(d: Decimal) -> String {
    format!("{:.2}", round2(d))
}

fn sanitize_number(number: &str) -> String {
    number.replace('/', "_")
}

/// Renders and stores invoice documents.
#[derive(Clone)]
pub struct DocumentService {
    document_dir: PathBuf,
    seller: SellerInfo,
    vat_rate: Decimal,
    currency: String,
}

impl DocumentService {
    pub fn new(
        document_dir: impl Into<PathBuf>,
        seller: SellerInfo,
        vat_rate: Decimal,
        currency: String,
    ) -> Self {
        Self {
            document_dir: document_dir.into(),
            seller,
            vat_rate,
            currency,
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(
            cfg.invoice_document_dir.clone(),
            SellerInfo::from_config(cfg),
            cfg.vat_rate_decimal(),
            cfg.currency.clone(),
        )
    }

    /// Relative path of a stored document, as persisted on the request.
    pub fn document_relative_path(payer_id: Uuid, number: &str) -> String {
        format!("{}/{}.txt", payer_id, sanitize_number(number))
    }

    fn document_path(&self, payer_id: Uuid, number: &str) -> PathBuf {
        self.document_dir
            .join(payer_id.to_string())
            .join(format!("{}.txt", sanitize_number(number)))
    }

    /// Renders the invoice as plain text.
    ///
    /// Pure function of its arguments: the same inputs always produce
    /// byte-identical output. The issue date is supplied by the caller, and
    /// the net/VAT columns are derived per line from the gross amount at
    /// the configured rate.
    pub fn render(
        &self,
        number: &str,
        issued_on: NaiveDate,
        billing: &BillingDetails,
        lines: &[InvoiceLine],
        total: Decimal,
    ) -> String {
        let amounts: Vec<Decimal> = if lines.iter().all(|l| l.gross.is_some()) {
            lines.iter().map(|l| l.gross.unwrap_or(Decimal::ZERO)).collect()
        } else {
            split_evenly(total, lines.len())
        };

        let rule = "=".repeat(RULE_WIDTH);
        let thin_rule = "-".repeat(RULE_WIDTH);

        let mut out = String::new();
        out.push_str(&rule);
        out.push('\n');
        out.push_str(&format!("VAT INVOICE {}\n", number));
        out.push_str(&format!("Issue date: {}\n", issued_on.format("%Y-%m-%d")));
        out.push_str(&rule);
        out.push_str("\n\n");

        out.push_str("Seller:\n");
        out.push_str(&format!("  {}\n", self.seller.name));
        out.push_str(&format!("  {}\n", self.seller.address));
        out.push_str(&format!("  NIP: {}\n\n", self.seller.nip));

        out.push_str("Buyer:\n");
        out.push_str(&format!("  {}\n", billing.name));
        out.push_str(&format!("  {}\n", billing.address));
        out.push_str(&format!("  {} {}\n", billing.postal_code, billing.city));
        if let Some(nip) = &billing.nip {
            out.push_str(&format!("  NIP: {}\n", nip));
        }
        out.push('\n');

        out.push_str(&format!(
            "{:>3}  {:<40} {:>8} {:>8} {:>8}\n",
            "No", "Item", "Net", "VAT", "Gross"
        ));
        out.push_str(&thin_rule);
        out.push('\n');

        let mut total_net = Decimal::ZERO;
        let mut total_vat = Decimal::ZERO;
        let mut total_gross = Decimal::ZERO;
        for (idx, (line, gross)) in lines.iter().zip(&amounts).enumerate() {
            let (net, vat) = split_vat(*gross, self.vat_rate);
            total_net += net;
            total_vat += vat;
            total_gross += *gross;

            let title: String = line.title.chars().take(40).collect();
            out.push_str(&format!(
                "{:>3}  {:<40} {:>8} {:>8} {:>8}\n",
                idx + 1,
                title,
                fmt_amount(net),
                fmt_amount(vat),
                fmt_amount(*gross),
            ));
        }

        out.push_str(&thin_rule);
        out.push('\n');
        out.push_str(&format!(
            "Total net:   {:>10} {}\n",
            fmt_amount(total_net),
            self.currency
        ));
        out.push_str(&format!(
            "Total VAT:   {:>10} {}\n",
            fmt_amount(total_vat),
            self.currency
        ));
        out.push_str(&format!(
            "Total due:   {:>10} {}\n",
            fmt_amount(total_gross),
            self.currency
        ));
        out.push_str(&rule);
        out.push('\n');
        out.push_str("Settled in full via online payment.\n");

        out
    }

    /// Writes a rendered document, refusing to overwrite.
    ///
    /// Returns the relative path to store on the invoice request.
    pub async fn store(
        &self,
        payer_id: Uuid,
        number: &str,
        content: &str,
    ) -> Result<String, ServiceError> {
        let path = self.document_path(payer_id, number);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                ServiceError::InternalError(format!("failed to create document dir: {}", e))
            })?;
        }

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => ServiceError::InvalidTransition(format!(
                    "invoice document for {} already exists",
                    number
                )),
                _ => ServiceError::InternalError(format!(
                    "failed to create invoice document: {}",
                    e
                )),
            })?;

        file.write_all(content.as_bytes()).await.map_err(|e| {
            ServiceError::InternalError(format!("failed to write invoice document: {}", e))
        })?;
        file.flush().await.map_err(|e| {
            ServiceError::InternalError(format!("failed to flush invoice document: {}", e))
        })?;

        debug!("Stored invoice document at {}", path.display());
        Ok(Self::document_relative_path(payer_id, number))
    }

    /// Reads a stored document back for serving over HTTP.
    pub async fn load(&self, payer_id: Uuid, number: &str) -> Result<String, ServiceError> {
        let path = self.document_path(payer_id, number);
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ServiceError::NotFound(
                format!("Invoice document {} not found", number),
            )),
            Err(e) => Err(ServiceError::InternalError(format!(
                "failed to read invoice document: {}",
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::path::Path;

    fn service_for(dir: &Path) -> DocumentService {
        DocumentService::new(
            dir,
            SellerInfo {
                name: "EduPay Sp. z o.o.".to_string(),
                address: "ul. Przykladowa 12, 00-001 Warszawa".to_string(),
                nip: "5260300246".to_string(),
            },
            dec!(0.23),
            "PLN".to_string(),
        )
    }

    fn sample_billing() -> BillingDetails {
        BillingDetails {
            name: "Jan Kowalski".to_string(),
            address: "ul. Polna 1".to_string(),
            postal_code: "00-950".to_string(),
            city: "Warszawa".to_string(),
            nip: None,
        }
    }

    #[test]
    fn render_is_byte_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service_for(dir.path());
        let lines = vec![
            InvoiceLine {
                title: "Advanced Rust".to_string(),
                gross: Some(dec!(100.00)),
            },
            InvoiceLine {
                title: "Async in Practice".to_string(),
                gross: Some(dec!(59.99)),
            },
        ];
        let issued = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();

        let a = svc.render("FV/2025/03/00007", issued, &sample_billing(), &lines, dec!(159.99));
        let b = svc.render("FV/2025/03/00007", issued, &sample_billing(), &lines, dec!(159.99));
        assert_eq!(a, b);
        assert!(a.contains("VAT INVOICE FV/2025/03/00007"));
        assert!(a.contains("Issue date: 2025-03-14"));
        assert!(a.contains("Total due:"));
    }

    #[test]
    fn buyer_nip_renders_only_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service_for(dir.path());
        let lines = vec![InvoiceLine {
            title: "Course".to_string(),
            gross: Some(dec!(123.00)),
        }];
        let issued = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();

        let without = svc.render("FV/2025/01/00001", issued, &sample_billing(), &lines, dec!(123.00));
        assert_eq!(without.matches("NIP:").count(), 1); // seller only

        let mut billing = sample_billing();
        billing.nip = Some("1234563218".to_string());
        let with = svc.render("FV/2025/01/00001", issued, &billing, &lines, dec!(123.00));
        assert_eq!(with.matches("NIP:").count(), 2);
    }

    #[test]
    fn line_vat_reconciles_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service_for(dir.path());
        let lines = vec![InvoiceLine {
            title: "Course".to_string(),
            gross: Some(dec!(123.00)),
        }];
        let issued = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        let doc = svc.render("FV/2025/01/00001", issued, &sample_billing(), &lines, dec!(123.00));
        assert!(doc.contains("100.00"));
        assert!(doc.contains("23.00"));
        assert!(doc.contains("123.00"));
    }

    #[test]
    fn even_split_absorbs_remainder() {
        let parts = split_evenly(dec!(100.00), 3);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], dec!(33.33));
        assert_eq!(parts[1], dec!(33.33));
        assert_eq!(parts[2], dec!(33.34));
        let sum: Decimal = parts.iter().copied().sum();
        assert_eq!(sum, dec!(100.00));

        assert!(split_evenly(dec!(10), 0).is_empty());
    }

    #[tokio::test]
    async fn store_refuses_overwrite_and_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service_for(dir.path());
        let payer = Uuid::new_v4();

        let rel = svc
            .store(payer, "FV/2025/03/00007", "document body")
            .await
            .unwrap();
        assert_eq!(rel, format!("{}/FV_2025_03_00007.txt", payer));

        let loaded = svc.load(payer, "FV/2025/03/00007").await.unwrap();
        assert_eq!(loaded, "document body");

        let second = svc.store(payer, "FV/2025/03/00007", "other body").await;
        assert!(matches!(second, Err(ServiceError::InvalidTransition(_))));
        // original content untouched
        assert_eq!(svc.load(payer, "FV/2025/03/00007").await.unwrap(), "document body");
    }

    #[tokio::test]
    async fn missing_document_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service_for(dir.path());
        let res = svc.load(Uuid::new_v4(), "FV/2025/01/00001").await;
        assert!(matches!(res, Err(ServiceError::NotFound(_))));
    }
}
