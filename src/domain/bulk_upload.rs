//! Product sheet import.
//!
//! One sheet row is one product/variant combination. Rows sharing a reference
//! number become one product with several variants. Bad rows are reported and
//! skipped; only an unreadable sheet or missing required columns stop the batch.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::aggregates::catalog::{ProductDraft, RawProduct, VariantDraft};
use crate::domain::value_objects::Money;
use crate::error::FieldErrors;

pub const REQUIRED_COLUMNS: [&str; 4] = ["ref_no", "name", "category", "variant_label"];

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RowError {
    /// 1-based, header excluded.
    pub row: usize,
    pub errors: FieldErrors,
}

#[derive(Debug, Clone, Default)]
pub struct ImportPlan {
    pub products: Vec<ProductDraft>,
    pub errors: Vec<RowError>,
}

impl ImportPlan {
    pub fn variant_count(&self) -> usize { self.products.iter().map(|p| p.variants.len()).sum() }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BulkUploadError {
    #[error("could not read sheet: {0}")]
    Unreadable(String),
    #[error("missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("sheet has no data rows")]
    Empty,
}

struct Columns(HashMap<String, usize>);

impl Columns {
    fn get<'r>(&self, record: &'r csv::StringRecord, name: &str) -> Option<&'r str> {
        self.0.get(name).and_then(|&i| record.get(i)).map(str::trim).filter(|v| !v.is_empty())
    }
}

pub fn plan_import(sheet: &[u8]) -> Result<ImportPlan, BulkUploadError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(sheet);

    let headers = reader.headers().map_err(|e| BulkUploadError::Unreadable(e.to_string()))?;
    let columns = Columns(
        headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().to_ascii_lowercase().replace(' ', "_"), i))
            .collect(),
    );
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|c| !columns.0.contains_key(**c))
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(BulkUploadError::MissingColumns(missing));
    }

    let mut plan = ImportPlan::default();
    let mut by_ref: HashMap<String, usize> = HashMap::new();
    let mut rows = 0;

    for (index, record) in reader.records().enumerate() {
        let row = index + 1;
        rows += 1;
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                plan.errors.push(RowError { row, errors: FieldErrors::single("row", e.to_string()) });
                continue;
            }
        };
        match parse_row(&columns, &record) {
            Ok(draft) => match by_ref.get(draft.ref_no.as_str()) {
                Some(&at) => plan.products[at].variants.extend(draft.variants),
                None => {
                    by_ref.insert(draft.ref_no.as_str().to_string(), plan.products.len());
                    plan.products.push(draft);
                }
            },
            Err(errors) => plan.errors.push(RowError { row, errors }),
        }
    }

    if rows == 0 {
        return Err(BulkUploadError::Empty);
    }
    Ok(plan)
}

fn parse_row(columns: &Columns, record: &csv::StringRecord) -> Result<ProductDraft, FieldErrors> {
    let mut errors = FieldErrors::new();
    let mut decimal = |name: &str| -> Option<Decimal> {
        let raw = columns.get(record, name)?;
        Decimal::from_str(raw.trim_start_matches('₹').replace(',', "").as_str())
            .map_err(|_| errors.add(name, format!("'{raw}' is not a number")))
            .ok()
    };
    let gst_rate = decimal("gst_rate");
    let discount = decimal("discount");
    let est_price = decimal("est_price").map(Money::new);
    let price = decimal("price").map(Money::new);

    let raw = RawProduct {
        ref_no: columns.get(record, "ref_no").unwrap_or_default().to_string(),
        name: columns.get(record, "name").unwrap_or_default().to_string(),
        description: columns.get(record, "description").map(str::to_string),
        category: columns.get(record, "category").unwrap_or_default().to_string(),
        brand: columns.get(record, "brand").map(str::to_string),
        cas_number: columns.get(record, "cas_number").map(str::to_string),
        gst_rate,
        discount,
    };
    let variant = VariantDraft {
        id: None,
        label: columns.get(record, "variant_label").unwrap_or_default().to_string(),
        est_price,
        price,
    };

    let parsed = ProductDraft::parse(raw, vec![variant]);
    match parsed {
        Ok(draft) if errors.is_empty() => Ok(draft),
        Ok(_) => Err(errors),
        Err(more) => {
            for field in more.fields() {
                for message in more.get(field).unwrap_or_default() {
                    errors.add(field, message.clone());
                }
            }
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::catalog::ProductCategory;

    #[test]
    fn test_groups_variants_and_reports_bad_rows() {
        let sheet = "\
ref_no,name,category,variant_label,est_price,price,discount
P100,Sodium chloride,chemicals,500g,450,,5
p100,Sodium chloride,chemicals,1kg,800,780,
P200,Teddy bear,toys,each,100,,
";
        let plan = plan_import(sheet.as_bytes()).unwrap();
        assert_eq!(plan.products.len(), 1);
        assert_eq!(plan.variant_count(), 2);
        let product = &plan.products[0];
        assert_eq!(product.ref_no.as_str(), "P100");
        assert_eq!(product.category, ProductCategory::Chemicals);
        assert_eq!(product.discount, Some(Decimal::from(5)));
        assert_eq!(product.variants[1].price, Some(Money::new(Decimal::from(780))));

        assert_eq!(plan.errors.len(), 1);
        assert_eq!(plan.errors[0].row, 3);
        assert!(plan.errors[0].errors.get("category").is_some());
    }

    #[test]
    fn test_bad_numbers_are_row_errors() {
        let sheet = "ref_no,name,category,variant_label,price\nA1,Flask,equipment,250ml,abc\nA2,Beaker,equipment,1l,\"1,200\"\n";
        let plan = plan_import(sheet.as_bytes()).unwrap();
        assert_eq!(plan.products.len(), 1);
        assert_eq!(plan.products[0].variants[0].price, Some(Money::new(Decimal::from(1200))));
        assert_eq!(plan.errors[0].row, 1);
        assert_eq!(plan.errors[0].errors.get("price"), Some(&["'abc' is not a number".to_string()][..]));
    }

    #[test]
    fn test_missing_columns_abort_batch() {
        let err = plan_import(b"ref_no,name\nP1,Thing\n").unwrap_err();
        assert_eq!(err, BulkUploadError::MissingColumns(vec!["category".into(), "variant_label".into()]));
    }

    #[test]
    fn test_header_only_sheet_is_empty() {
        assert_eq!(plan_import(b"ref_no,name,category,variant_label\n").unwrap_err(), BulkUploadError::Empty);
    }

    #[test]
    fn test_headers_are_normalized() {
        let sheet = "Ref No,Name,Category,Variant Label,Est Price\nX9,Gloves,consumables,M,120\n";
        let plan = plan_import(sheet.as_bytes()).unwrap();
        assert_eq!(plan.products[0].variants[0].est_price, Some(Money::new(Decimal::from(120))));
    }
}
