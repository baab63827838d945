use actix_files::Files;
use actix_multipart::Multipart;
use actix_web::http::StatusCode;
use actix_web::{Error, HttpResponse, web};
use futures::{StreamExt, TryStreamExt};
use log::error;
use serde::Serialize;
use std::io::Write;

use crate::classifier::ClassifierModel;
use crate::data::Table;
use crate::viz::PlotStore;
use shared::Company;

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig, static_dir: String) {
    cfg.service(web::resource("/").route(web::get().to(home)))
        .service(web::resource("/predict_csv/").route(web::post().to(predict_csv)))
        .service(web::resource("/predict_json/").route(web::post().to(predict_json)))
        .service(web::resource("/visualize/").route(web::post().to(visualize)))
        .service(Files::new("/static", static_dir));
}

const HOME_PAGE: &str = r#"<html>
<head>
    <title>Company Classifier</title>
</head>
<body>
    <h1>Upload CSV file for prediction</h1>
    <form action="/predict_csv/" method="post" enctype="multipart/form-data">
        <input type="file" name="file"><br><br>
        <input type="submit" value="Upload">
    </form>
    <h1>Upload CSV file for visualization</h1>
    <form action="/visualize/" method="post" enctype="multipart/form-data">
        <input type="file" name="file"><br><br>
        <input type="submit" value="Upload">
    </form>
</body>
</html>
"#;

async fn home() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(HOME_PAGE)
}

/// Collect the bytes of the uploaded file from the multipart stream.
async fn read_upload(payload: &mut Multipart) -> Result<Vec<u8>, Error> {
    let mut bytes = Vec::new();
    while let Ok(Some(mut field)) = payload.try_next().await {
        while let Some(chunk) = field.next().await {
            let data = chunk?;
            bytes.write_all(&data)?;
        }
    }
    Ok(bytes)
}

/// `POST /predict_csv/`: parse the uploaded CSV, predict every row and
/// return the table with an appended `predictions` column as a download.
/// Failures answer 200 with a JSON error body; `/predict_json/` answers
/// 400 instead.
async fn predict_csv(
    model: web::Data<ClassifierModel>,
    mut payload: Multipart,
) -> Result<HttpResponse, Error> {
    let bytes = read_upload(&mut payload).await?;

    match predict_table(model.get_ref(), &bytes) {
        Ok(csv) => Ok(HttpResponse::Ok()
            .content_type("text/csv")
            .insert_header(("Content-Disposition", "attachment;filename=predictions.csv"))
            .body(csv)),
        Err(message) => {
            error!("CSV prediction failed: {message}");
            Ok(HttpResponse::Ok().json(ErrorResponse { error: message }))
        }
    }
}

fn predict_table(model: &ClassifierModel, bytes: &[u8]) -> Result<String, String> {
    let table = Table::from_csv(bytes).map_err(|e| e.to_string())?;
    let labels = model.predict(&table).map_err(|e| e.to_string())?;
    table
        .to_csv_with_predictions(&labels)
        .map_err(|e| e.to_string())
}

/// `POST /predict_json/`: predict a list of company records, returning
/// one label per record in input order.
async fn predict_json(
    model: web::Data<ClassifierModel>,
    records: web::Json<Vec<Company>>,
) -> HttpResponse {
    let columns: Vec<String> = Company::FIELDS.iter().map(|f| f.to_string()).collect();
    let rows: Vec<Vec<f64>> = records.iter().map(|c| c.as_row().to_vec()).collect();
    let table = Table::from_rows(columns, rows);

    match model.predict(&table) {
        Ok(labels) => HttpResponse::Ok().json(labels),
        Err(e) => {
            error!("JSON prediction failed: {e}");
            HttpResponse::BadRequest().body(e.to_string())
        }
    }
}

/// `POST /visualize/`: three sequential stages with independent failure
/// reporting. Parse errors answer 400, render errors 500 and page
/// composition errors a non-standard 600.
async fn visualize(
    store: web::Data<PlotStore>,
    mut payload: Multipart,
) -> Result<HttpResponse, Error> {
    let bytes = read_upload(&mut payload).await?;

    let table = match Table::from_csv(&bytes) {
        Ok(table) => table,
        Err(e) => return Ok(HttpResponse::BadRequest().body(e.to_string())),
    };

    let request = match store.begin_request() {
        Ok(request) => request,
        Err(e) => {
            error!("Failed to allocate plot directory: {e}");
            return Ok(HttpResponse::InternalServerError().body(e.to_string()));
        }
    };

    let mut plots = Vec::with_capacity(table.n_cols());
    for (idx, column) in table.column_names().iter().enumerate() {
        match request.render_column(column, &table.column(idx)) {
            Ok(url) => plots.push((column.clone(), url)),
            Err(e) => {
                error!("Failed to render plot for column '{column}': {e}");
                return Ok(HttpResponse::InternalServerError().body(e.to_string()));
            }
        }
    }

    match compose_page(&plots) {
        Ok(html) => Ok(HttpResponse::Ok()
            .content_type("text/html; charset=utf-8")
            .body(html)),
        Err(e) => {
            error!("Failed to compose visualization page: {e}");
            let status = StatusCode::from_u16(600).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            Ok(HttpResponse::build(status).body(e.to_string()))
        }
    }
}

fn compose_page(plots: &[(String, String)]) -> Result<String, std::fmt::Error> {
    use std::fmt::Write;

    let mut html = String::new();
    writeln!(html, "<html>")?;
    writeln!(html, "<head><title>Column distributions</title></head>")?;
    writeln!(html, "<body>")?;
    writeln!(html, "<h1>Column distributions</h1>")?;
    for (column, url) in plots {
        writeln!(html, "<h2>{column}</h2>")?;
        writeln!(html, "<img src=\"{url}\" alt=\"{column}\">")?;
    }
    writeln!(html, "</body>")?;
    writeln!(html, "</html>")?;
    Ok(html)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, test};
    use serde_json::Value;
    use tempfile::TempDir;

    fn test_model() -> ClassifierModel {
        // score = revenues - 100: large companies are flagged
        ClassifierModel::new(
            Company::FIELDS.iter().map(|f| f.to_string()).collect(),
            vec!["solvent".to_string(), "distressed".to_string()],
            vec![vec![0.0, 0.0, 0.0, 0.0, 0.0, 1.0]],
            vec![-100.0],
        )
        .unwrap()
    }

    fn sample_csv() -> String {
        format!(
            "{}\n0.1,0.2,0.3,0.4,0.5,50\n0.1,0.2,0.3,0.4,0.5,500\n",
            Company::FIELDS.join(",")
        )
    }

    const BOUNDARY: &str = "----test-boundary";

    fn multipart_body(contents: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            b"Content-Disposition: form-data; name=\"file\"; filename=\"data.csv\"\r\n",
        );
        body.extend_from_slice(b"Content-Type: text/csv\r\n\r\n");
        body.extend_from_slice(contents);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn multipart_content_type() -> String {
        format!("multipart/form-data; boundary={BOUNDARY}")
    }

    macro_rules! test_app {
        ($tmp:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new(test_model()))
                    .app_data(web::Data::new(PlotStore::new($tmp.path()).unwrap()))
                    .configure(|cfg| {
                        configure_routes(cfg, $tmp.path().to_string_lossy().into_owned())
                    }),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn home_serves_upload_forms() {
        let tmp = TempDir::new().unwrap();
        let app = test_app!(tmp);

        let req = test::TestRequest::get().uri("/").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let body = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
        assert!(body.contains("/predict_csv/"));
        assert!(body.contains("/visualize/"));
    }

    #[actix_web::test]
    async fn predict_csv_appends_predictions_column() {
        let tmp = TempDir::new().unwrap();
        let app = test_app!(tmp);

        let req = test::TestRequest::post()
            .uri("/predict_csv/")
            .insert_header(("content-type", multipart_content_type()))
            .set_payload(multipart_body(sample_csv().as_bytes()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get("content-type").unwrap(), "text/csv");

        let body = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
        let lines: Vec<&str> = body.trim_end().lines().collect();
        assert_eq!(lines.len(), 3, "same row count plus header: {body}");
        assert!(lines[0].ends_with(",predictions"));
        assert!(lines[1].ends_with(",solvent"));
        assert!(lines[2].ends_with(",distressed"));
    }

    #[actix_web::test]
    async fn predict_csv_schema_mismatch_yields_soft_error() {
        let tmp = TempDir::new().unwrap();
        let app = test_app!(tmp);

        let req = test::TestRequest::post()
            .uri("/predict_csv/")
            .insert_header(("content-type", multipart_content_type()))
            .set_payload(multipart_body(b"wrong,columns\n1,2\n"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        // prediction failures ride a 200 with an error field, not a 4xx
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        assert!(body.get("error").is_some(), "{body}");
    }

    #[actix_web::test]
    async fn predict_json_returns_one_label_per_record() {
        let tmp = TempDir::new().unwrap();
        let app = test_app!(tmp);

        let records = serde_json::json!([
            {
                "gross_margin_ratio": 0.1,
                "core_income_ratio": 0.2,
                "cash_asset_ratio": 0.3,
                "consolidated_liabilities_ratio": 0.4,
                "tangible_assets_ratio": 0.5,
                "revenues": 50.0
            },
            {
                "gross_margin_ratio": 0.1,
                "core_income_ratio": 0.2,
                "cash_asset_ratio": 0.3,
                "consolidated_liabilities_ratio": 0.4,
                "tangible_assets_ratio": 0.5,
                "revenues": 500.0
            }
        ]);

        let req = test::TestRequest::post()
            .uri("/predict_json/")
            .set_json(&records)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let labels: Vec<String> = test::read_body_json(resp).await;
        assert_eq!(labels, ["solvent", "distressed"]);
    }

    #[actix_web::test]
    async fn predict_json_rejects_wrong_field_type() {
        let tmp = TempDir::new().unwrap();
        let app = test_app!(tmp);

        let records = serde_json::json!([
            {
                "gross_margin_ratio": "not-a-number",
                "core_income_ratio": 0.2,
                "cash_asset_ratio": 0.3,
                "consolidated_liabilities_ratio": 0.4,
                "tangible_assets_ratio": 0.5,
                "revenues": 50.0
            }
        ]);

        let req = test::TestRequest::post()
            .uri("/predict_json/")
            .set_json(&records)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn visualize_emits_one_image_per_column_in_order() {
        let tmp = TempDir::new().unwrap();
        let app = test_app!(tmp);

        let req = test::TestRequest::post()
            .uri("/visualize/")
            .insert_header(("content-type", multipart_content_type()))
            .set_payload(multipart_body(b"a,b\n1,10\n2,20\n3,30\n"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
        let a_pos = body.find("/a.png").expect("a.png img tag");
        let b_pos = body.find("/b.png").expect("b.png img tag");
        assert!(a_pos < b_pos, "images must follow source column order");
        assert_eq!(body.matches("<img ").count(), 2);

        // the artifacts themselves land in a request-scoped directory
        let request_dir = std::fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .find(|p| p.is_dir())
            .expect("request directory");
        assert!(request_dir.join("a.png").is_file());
        assert!(request_dir.join("b.png").is_file());
    }

    #[actix_web::test]
    async fn visualize_rejects_empty_payload() {
        let tmp = TempDir::new().unwrap();
        let app = test_app!(tmp);

        let req = test::TestRequest::post()
            .uri("/visualize/")
            .insert_header(("content-type", multipart_content_type()))
            .set_payload(multipart_body(b""))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn visualize_rejects_non_csv_payload() {
        let tmp = TempDir::new().unwrap();
        let app = test_app!(tmp);

        let req = test::TestRequest::post()
            .uri("/visualize/")
            .insert_header(("content-type", multipart_content_type()))
            .set_payload(multipart_body(&[0xff, 0xd8, 0xff, 0xe0]))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
