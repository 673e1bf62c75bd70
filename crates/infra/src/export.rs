//! Ledger export (CSV stream, XLSX workbook).
//!
//! Rows are pulled from `LedgerStore::scan` in keyset batches, newest first,
//! so an export of any size holds at most one batch in memory and a CSV export
//! can be resumed from the last cursor it produced. The XLSX sheet runs in
//! constant-memory mode: each batch is written straight through to a temp
//! file rather than kept in the workbook.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use futures_util::stream::{self, Stream};
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use serde::Serialize;

use stockledger_inventory::MovementType;

use crate::query::{FilterParams, QueryError};
use crate::store::{Cursor, LedgerRecord, LedgerStore, MovementFilter};

pub const HEADERS: [&str; 11] = [
    "date",
    "product",
    "sku",
    "type",
    "origin",
    "quantity",
    "previousStock",
    "newStock",
    "reason",
    "orderId",
    "createdById",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateFormat {
    /// RFC 3339 in UTC with milliseconds.
    #[default]
    Iso,
    /// `dd/mm/yyyy HH:MM:SS` in the export time zone.
    Local,
}

impl FromStr for DateFormat {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "iso" => Ok(DateFormat::Iso),
            "local" => Ok(DateFormat::Local),
            _ => Err(QueryError::Validation(format!(
                "dateFormat must be 'iso' or 'local', got '{s}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    pub date_format: DateFormat,
    pub tz: Tz,
}

impl ExportOptions {
    /// Read `dateFormat`/`dateTz`; a missing zone falls back to `default_tz`.
    pub fn from_params(params: &FilterParams, default_tz: Tz) -> Result<Self, QueryError> {
        let blank = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
        let date_format = blank(&params.date_format)
            .map(|s| s.parse::<DateFormat>())
            .transpose()?
            .unwrap_or_default();
        let tz = match blank(&params.date_tz) {
            Some(name) => name
                .parse::<Tz>()
                .map_err(|_| QueryError::Validation(format!("unknown time zone '{name}'")))?,
            None => default_tz,
        };
        Ok(Self { date_format, tz })
    }

    pub fn format_date(&self, at: DateTime<Utc>) -> String {
        match self.date_format {
            DateFormat::Iso => at.to_rfc3339_opts(SecondsFormat::Millis, true),
            DateFormat::Local => at.with_timezone(&self.tz).format("%d/%m/%Y %H:%M:%S").to_string(),
        }
    }
}

/// One exported line; field order matches `HEADERS`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportRow {
    pub date: String,
    pub product: String,
    pub sku: String,
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    pub origin: String,
    pub quantity: i64,
    pub previous_stock: i64,
    pub new_stock: i64,
    pub reason: String,
    pub order_id: String,
    pub created_by_id: String,
}

impl ExportRow {
    pub fn from_record(record: &LedgerRecord, opts: &ExportOptions) -> Self {
        let m = &record.movement;
        Self {
            date: opts.format_date(m.created_at),
            product: record.product.name.clone(),
            sku: record.product.sku.clone().unwrap_or_default(),
            movement_type: m.movement_type,
            origin: m.origin_label(),
            quantity: m.quantity,
            previous_stock: m.previous_stock,
            new_stock: m.new_stock,
            reason: m.reason.clone().unwrap_or_default(),
            order_id: m.order_id.map(|id| id.to_string()).unwrap_or_default(),
            created_by_id: m.created_by_id.map(|id| id.to_string()).unwrap_or_default(),
        }
    }
}

fn csv_error(err: impl std::fmt::Display) -> QueryError {
    QueryError::Export(format!("csv: {err}"))
}

pub fn csv_header() -> Result<Vec<u8>, QueryError> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(HEADERS).map_err(csv_error)?;
    wtr.into_inner().map_err(csv_error)
}

pub fn csv_rows(records: &[LedgerRecord], opts: &ExportOptions) -> Result<Vec<u8>, QueryError> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    for record in records {
        wtr.serialize(ExportRow::from_record(record, opts)).map_err(csv_error)?;
    }
    wtr.into_inner().map_err(csv_error)
}

enum Scan {
    Header,
    Rows(Option<Cursor>),
    Done,
}

/// Lazily encoded CSV: the header chunk, then one chunk per ledger batch.
///
/// `after` resumes a previous export strictly after that entry (the header is
/// still emitted).
pub fn csv_stream<L>(
    ledger: L,
    filter: MovementFilter,
    opts: ExportOptions,
    batch_size: u32,
    after: Option<Cursor>,
) -> impl Stream<Item = Result<Vec<u8>, QueryError>> + Send + 'static
where
    L: LedgerStore + 'static,
{
    let batch_size = batch_size.max(1);
    stream::try_unfold(
        (Scan::Header, ledger, filter),
        move |(state, ledger, filter)| async move {
            match state {
                Scan::Header => Ok(Some((csv_header()?, (Scan::Rows(after), ledger, filter)))),
                Scan::Rows(cursor) => {
                    let batch = ledger.scan(&filter, cursor, batch_size).await?;
                    if batch.is_empty() {
                        return Ok(None);
                    }
                    let next = if (batch.len() as u32) < batch_size {
                        Scan::Done
                    } else {
                        Scan::Rows(batch.last().map(LedgerRecord::cursor))
                    };
                    tracing::debug!(rows = batch.len(), "export batch encoded");
                    Ok(Some((csv_rows(&batch, &opts)?, (next, ledger, filter))))
                }
                Scan::Done => Ok(None),
            }
        },
    )
}

fn xlsx_error(err: XlsxError) -> QueryError {
    QueryError::Export(format!("xlsx: {err}"))
}

/// Data rows that fit in one sheet below the header row.
pub const XLSX_MAX_ROWS: u32 = 1_048_575;

/// Build the workbook, one scanned batch at a time.
pub async fn xlsx_workbook<L>(
    ledger: &L,
    filter: &MovementFilter,
    opts: &ExportOptions,
    batch_size: u32,
) -> Result<Vec<u8>, QueryError>
where
    L: LedgerStore,
{
    xlsx_workbook_capped(ledger, filter, opts, batch_size, XLSX_MAX_ROWS).await
}

async fn xlsx_workbook_capped<L>(
    ledger: &L,
    filter: &MovementFilter,
    opts: &ExportOptions,
    batch_size: u32,
    max_rows: u32,
) -> Result<Vec<u8>, QueryError>
where
    L: LedgerStore,
{
    let batch_size = batch_size.max(1);
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet_with_constant_memory();
    write_header(sheet)?;

    let mut written: u32 = 0;
    let mut cursor = None;
    loop {
        let batch = ledger.scan(filter, cursor, batch_size).await?;
        if u64::from(written) + batch.len() as u64 > u64::from(max_rows) {
            return Err(QueryError::Validation(format!(
                "export has more than {max_rows} rows, the XLSX sheet limit; narrow the filter or export CSV"
            )));
        }
        for record in &batch {
            written += 1;
            write_row(sheet, written, &ExportRow::from_record(record, opts))?;
        }
        tracing::debug!(rows = batch.len(), total = written, "export batch written");
        if (batch.len() as u32) < batch_size {
            break;
        }
        cursor = batch.last().map(LedgerRecord::cursor);
    }

    workbook.save_to_buffer().map_err(xlsx_error)
}

fn write_header(sheet: &mut Worksheet) -> Result<(), QueryError> {
    let bold = Format::new().set_bold();
    sheet.set_name("Stock movements").map_err(xlsx_error)?;
    for (col, name) in HEADERS.iter().enumerate() {
        sheet
            .write_string_with_format(0, col as u16, *name, &bold)
            .map_err(xlsx_error)?;
    }
    Ok(())
}

fn write_row(sheet: &mut Worksheet, row: u32, r: &ExportRow) -> Result<(), QueryError> {
    sheet.write_string(row, 0, &r.date).map_err(xlsx_error)?;
    sheet.write_string(row, 1, &r.product).map_err(xlsx_error)?;
    sheet.write_string(row, 2, &r.sku).map_err(xlsx_error)?;
    sheet.write_string(row, 3, r.movement_type.as_str()).map_err(xlsx_error)?;
    sheet.write_string(row, 4, &r.origin).map_err(xlsx_error)?;
    sheet.write_number(row, 5, r.quantity as f64).map_err(xlsx_error)?;
    sheet.write_number(row, 6, r.previous_stock as f64).map_err(xlsx_error)?;
    sheet.write_number(row, 7, r.new_stock as f64).map_err(xlsx_error)?;
    sheet.write_string(row, 8, &r.reason).map_err(xlsx_error)?;
    sheet.write_string(row, 9, &r.order_id).map_err(xlsx_error)?;
    sheet.write_string(row, 10, &r.created_by_id).map_err(xlsx_error)?;
    Ok(())
}

/// Export entry point used by the HTTP layer.
#[derive(Debug, Clone)]
pub struct ExportService<L> {
    ledger: L,
    default_tz: Tz,
    batch_size: u32,
}

impl<L> ExportService<L>
where
    L: LedgerStore + Clone + 'static,
{
    pub fn new(ledger: L, default_tz: Tz, batch_size: u32) -> Self {
        Self {
            ledger,
            default_tz,
            batch_size,
        }
    }

    /// Validate parameters up front so a bad request fails before any bytes
    /// are streamed.
    pub fn csv(
        &self,
        params: &FilterParams,
    ) -> Result<impl Stream<Item = Result<Vec<u8>, QueryError>> + Send + 'static, QueryError> {
        let filter = params.into_filter()?;
        let opts = ExportOptions::from_params(params, self.default_tz)?;
        Ok(csv_stream(self.ledger.clone(), filter, opts, self.batch_size, None))
    }

    pub async fn xlsx(&self, params: &FilterParams) -> Result<Vec<u8>, QueryError> {
        let filter = params.into_filter()?;
        let opts = ExportOptions::from_params(params, self.default_tz)?;
        xlsx_workbook(&self.ledger, &filter, &opts, self.batch_size).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::TimeZone;
    use futures_util::TryStreamExt;
    use stockledger_core::{OrderId, ProductId};
    use stockledger_inventory::{MovementContext, NewProduct};

    use crate::engine::{ReconciliationEngine, RetryPolicy};
    use crate::store::{CatalogStore, InMemoryStore};

    #[test]
    fn dates_render_in_both_formats() {
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 12, 30, 0).unwrap();
        let iso = ExportOptions {
            date_format: DateFormat::Iso,
            tz: Tz::UTC,
        };
        assert_eq!(iso.format_date(at), "2024-01-15T12:30:00.000Z");

        let local = ExportOptions {
            date_format: DateFormat::Local,
            tz: chrono_tz::America::Sao_Paulo,
        };
        assert_eq!(local.format_date(at), "15/01/2024 09:30:00");
    }

    #[test]
    fn unknown_zone_and_format_are_rejected() {
        let params = FilterParams {
            date_tz: Some("Mars/Olympus".into()),
            ..Default::default()
        };
        assert!(matches!(
            ExportOptions::from_params(&params, Tz::UTC),
            Err(QueryError::Validation(_))
        ));
        let params = FilterParams {
            date_format: Some("excel".into()),
            ..Default::default()
        };
        assert!(ExportOptions::from_params(&params, Tz::UTC).is_err());

        let defaulted = ExportOptions::from_params(
            &FilterParams {
                date_format: Some("local".into()),
                ..Default::default()
            },
            chrono_tz::Europe::Lisbon,
        )
        .unwrap();
        assert_eq!(defaulted.tz, chrono_tz::Europe::Lisbon);
    }

    async fn ledger_with(n: usize) -> (Arc<InMemoryStore>, ProductId) {
        let store = Arc::new(InMemoryStore::new());
        let p = NewProduct {
            sku: Some("EXP-1".into()),
            name: "Widget, large".into(),
            price: 0,
            stock: 1_000,
            active: true,
        }
        .into_product(ProductId::new())
        .unwrap();
        let id = p.id;
        store.insert_product(p).await.unwrap();
        let engine = ReconciliationEngine::new(store.clone(), RetryPolicy::default());
        for _ in 0..n {
            engine
                .reconcile(id, -1, MovementType::OrderCreate, MovementContext::for_order(OrderId::new()))
                .await
                .unwrap();
        }
        (store, id)
    }

    #[tokio::test]
    async fn csv_stream_spans_batches_newest_first() {
        let (store, _) = ledger_with(7).await;
        let opts = ExportOptions {
            date_format: DateFormat::Iso,
            tz: Tz::UTC,
        };
        let chunks: Vec<Vec<u8>> = csv_stream(store, MovementFilter::default(), opts, 3, None)
            .try_collect()
            .await
            .unwrap();
        // header + 3 + 3 + 1
        assert_eq!(chunks.len(), 4);

        let text = String::from_utf8(chunks.concat()).unwrap();
        let mut rdr = csv::Reader::from_reader(text.as_bytes());
        let headers: Vec<String> = rdr.headers().unwrap().iter().map(str::to_string).collect();
        assert_eq!(headers, HEADERS);

        let rows: Vec<csv::StringRecord> = rdr.records().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 7);
        assert_eq!(&rows[0][1], "Widget, large");
        assert_eq!(&rows[0][3], "ORDER_CREATE");
        assert!(rows[0][4].starts_with("Order "));
        // newest first: the latest entry has the lowest remaining stock
        assert_eq!(&rows[0][7], "993");
        assert_eq!(&rows[6][7], "999");
    }

    #[tokio::test]
    async fn csv_stream_resumes_after_cursor() {
        let (store, _) = ledger_with(4).await;
        let all = store.scan(&MovementFilter::default(), None, 10).await.unwrap();
        let opts = ExportOptions {
            date_format: DateFormat::Iso,
            tz: Tz::UTC,
        };
        let chunks: Vec<Vec<u8>> = csv_stream(
            store.clone(),
            MovementFilter::default(),
            opts,
            10,
            Some(all[1].cursor()),
        )
        .try_collect()
        .await
        .unwrap();
        let text = String::from_utf8(chunks.concat()).unwrap();
        assert_eq!(csv::Reader::from_reader(text.as_bytes()).records().count(), 2);
    }

    #[tokio::test]
    async fn xlsx_export_produces_a_zip_container() {
        let (store, _) = ledger_with(2).await;
        let svc = ExportService::new(store, Tz::UTC, 500);
        let bytes = svc.xlsx(&FilterParams::default()).await.unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[tokio::test]
    async fn xlsx_export_over_the_row_limit_is_rejected() {
        let (store, _) = ledger_with(5).await;
        let opts = ExportOptions {
            date_format: DateFormat::Iso,
            tz: Tz::UTC,
        };
        let filter = MovementFilter::default();

        let err = xlsx_workbook_capped(&store, &filter, &opts, 2, 4).await.unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));

        let bytes = xlsx_workbook_capped(&store, &filter, &opts, 2, 5).await.unwrap();
        assert!(bytes.starts_with(b"PK"));
    }
}
