use actix_web::{get, post, web, App, HttpResponse, HttpServer, Responder};
use actix_multipart::Multipart;
use futures::{StreamExt, TryStreamExt};
use uuid::Uuid;
use std::sync::Arc;
use actix_cors::Cors;
use report_finder_lib::{input_loader, logger, CompanyColumn, FinderError, FinderSettings, InputFormat};
use report_finder_lib::exporter::{EXPORT_FILENAME, EXPORT_MIME};

mod job_manager;
use job_manager::{JobManager, JobState};

struct AppState {
    job_manager: Arc<JobManager>,
    /// Defaults from config file / environment; uploads override per job.
    base_settings: FinderSettings,
}

/// Fields collected from the upload form. Everything stays in memory.
#[derive(Default)]
struct UploadForm {
    file_name: Option<String>,
    file_bytes: Vec<u8>,
    api_key: Option<String>,
    provider: Option<String>,
    cx: Option<String>,
    column: Option<String>,
}

impl UploadForm {
    fn settings(&self, base: &FinderSettings) -> Result<FinderSettings, String> {
        let mut settings = base.clone();
        if let Some(provider) = non_empty(&self.provider) {
            settings.provider = provider.parse()?;
        }
        if let Some(key) = non_empty(&self.api_key) {
            settings.api_key = key.to_string();
        }
        if let Some(cx) = non_empty(&self.cx) {
            settings.search_engine_id = Some(cx.to_string());
        }
        if let Some(column) = non_empty(&self.column) {
            settings.company_column = Some(column.to_string());
        }
        Ok(settings)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn bad_request(message: impl std::fmt::Display) -> HttpResponse {
    HttpResponse::BadRequest().json(serde_json::json!({
        "status": "error",
        "message": message.to_string()
    }))
}

async fn read_form(mut payload: Multipart) -> Result<UploadForm, String> {
    let mut form = UploadForm::default();

    while let Some(mut field) = payload.try_next().await.map_err(|e| e.to_string())? {
        let content_disposition = field.content_disposition();
        let name = content_disposition.and_then(|cd| cd.get_name()).unwrap_or("").to_string();
        if name == "file" {
            form.file_name = content_disposition.and_then(|cd| cd.get_filename()).map(str::to_string);
        }

        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| e.to_string())?;
            data.extend_from_slice(&chunk);
        }

        if name == "file" {
            form.file_bytes = data;
            continue;
        }
        let text = String::from_utf8_lossy(&data).into_owned();
        match name.as_str() {
            "api_key" => form.api_key = Some(text),
            "provider" => form.provider = Some(text),
            "cx" => form.cx = Some(text),
            "column" => form.column = Some(text),
            other => log::debug!("Ignoring upload field '{}'", other),
        }
    }
    Ok(form)
}

#[get("/api/health")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json("Server is running")
}

#[post("/api/upload")]
async fn upload_file(payload: Multipart, data: web::Data<AppState>) -> impl Responder {
    let form = match read_form(payload).await {
        Ok(form) => form,
        Err(e) => return bad_request(format!("Invalid upload: {}", e)),
    };

    let settings = match form.settings(&data.base_settings) {
        Ok(s) => s,
        Err(e) => return bad_request(e),
    };
    // Blocking checks happen before any job exists.
    if let Err(e) = settings.validate() {
        return bad_request(e);
    }
    if form.file_bytes.is_empty() {
        return bad_request("No company list uploaded");
    }

    let file_name = form.file_name.as_deref().unwrap_or("upload.csv");
    let format = InputFormat::detect(file_name, &form.file_bytes);
    let column = CompanyColumn::from_setting(settings.company_column.as_deref());
    let companies = match input_loader::parse_companies(&form.file_bytes, format, &column) {
        Ok(c) if c.is_empty() => return bad_request(FinderError::EmptyInput),
        Ok(c) => c,
        Err(e) => return bad_request(e),
    };

    let job_id = Uuid::new_v4().to_string();
    let total = companies.len();
    log::info!("Upload '{}' accepted as job {} ({} companies)", file_name, job_id, total);
    data.job_manager.start_job(job_id.clone(), settings, companies);

    HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "job_id": job_id,
        "total": total,
        "message": "File uploaded and job queued."
    }))
}

#[get("/api/status/{job_id}")]
async fn get_status(path: web::Path<String>, data: web::Data<AppState>) -> impl Responder {
    let job_id = path.into_inner();
    match data.job_manager.status(&job_id) {
        Some(job) => HttpResponse::Ok().json(job),
        None => HttpResponse::NotFound().json("Job not found"),
    }
}

#[get("/api/download/{job_id}")]
async fn download_result(path: web::Path<String>, data: web::Data<AppState>) -> impl Responder {
    let job_id = path.into_inner();
    match data.job_manager.export(&job_id) {
        Some(Ok(content)) => HttpResponse::Ok()
            .content_type(EXPORT_MIME)
            .append_header(("Content-Disposition", format!("attachment; filename=\"{}\"", EXPORT_FILENAME)))
            .body(content),
        Some(Err(JobState::Failed)) => HttpResponse::Conflict().json("Job failed, no results to download."),
        Some(Err(_)) => HttpResponse::Conflict().json("Results not ready yet."),
        None => HttpResponse::NotFound().json("Job not found"),
    }
}

fn app_config(cfg: &mut web::ServiceConfig) {
    cfg.service(health_check)
        .service(upload_file)
        .service(get_status)
        .service(download_result);
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    logger::init(log::LevelFilter::Info);

    let base_settings = FinderSettings::load(None)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;
    let bind = std::env::var("REPORT_FINDER_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    let job_manager = Arc::new(JobManager::new());
    let state = web::Data::new(AppState { job_manager, base_settings });

    log::info!("Starting Web Server at http://{}", bind);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header();

        App::new()
            .wrap(cors)
            .app_data(state.clone())
            .configure(app_config)
    })
    .bind(bind)?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::{header, StatusCode};
    use actix_web::test;
    use std::time::Duration;

    const BOUNDARY: &str = "----reportfinderboundary";

    fn multipart_body(fields: &[(&str, Option<&str>, &str)]) -> Vec<u8> {
        let mut body = String::new();
        for (name, filename, value) in fields {
            body.push_str(&format!("--{}\r\n", BOUNDARY));
            match filename {
                Some(f) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: text/csv\r\n\r\n",
                    name, f
                )),
                None => body.push_str(&format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)),
            }
            body.push_str(value);
            body.push_str("\r\n");
        }
        body.push_str(&format!("--{}--\r\n", BOUNDARY));
        body.into_bytes()
    }

    fn state() -> web::Data<AppState> {
        state_with_delay(0)
    }

    fn state_with_delay(delay_ms: u64) -> web::Data<AppState> {
        web::Data::new(AppState {
            job_manager: Arc::new(JobManager::new()),
            base_settings: FinderSettings {
                serpapi_endpoint: "http://127.0.0.1:1/search.json".to_string(),
                delay_ms,
                ..FinderSettings::default()
            },
        })
    }

    fn upload_request(fields: &[(&str, Option<&str>, &str)]) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/api/upload")
            .insert_header((
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            ))
            .set_payload(multipart_body(fields))
    }

    #[actix_web::test]
    async fn test_health() {
        let app = test::init_service(App::new().app_data(state()).configure(app_config)).await;
        let resp = test::call_service(&app, test::TestRequest::get().uri("/api/health").to_request()).await;
        assert!(resp.status().is_success());
    }

    #[actix_web::test]
    async fn test_upload_without_api_key_is_rejected() {
        let app = test::init_service(App::new().app_data(state()).configure(app_config)).await;
        let req = upload_request(&[("file", Some("companies.csv"), "Acme\nGlobex\n")]).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["message"].as_str().unwrap().contains("API key"));
    }

    #[actix_web::test]
    async fn test_upload_with_missing_column_is_rejected() {
        let app = test::init_service(App::new().app_data(state()).configure(app_config)).await;
        let req = upload_request(&[
            ("api_key", None, "key"),
            ("column", None, "Company Name"),
            ("file", Some("companies.csv"), "Name\nAcme\n"),
        ])
        .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["message"].as_str().unwrap().contains("Company Name"));
    }

    #[actix_web::test]
    async fn test_upload_starts_job() {
        let app = test::init_service(App::new().app_data(state()).configure(app_config)).await;
        let req = upload_request(&[
            ("api_key", None, "key"),
            ("file", Some("companies.csv"), "Acme\nGlobex\n"),
        ])
        .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["total"], 2);

        let job_id = body["job_id"].as_str().unwrap().to_string();
        let status = test::TestRequest::get()
            .uri(&format!("/api/status/{}", job_id))
            .to_request();
        let resp = test::call_service(&app, status).await;
        assert!(resp.status().is_success());
    }

    #[actix_web::test]
    async fn test_download_unknown_job() {
        let app = test::init_service(App::new().app_data(state()).configure(app_config)).await;
        let req = test::TestRequest::get().uri("/api/download/missing").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_download_after_job_completes() {
        let app = test::init_service(App::new().app_data(state()).configure(app_config)).await;
        let req = upload_request(&[
            ("api_key", None, "server-secret"),
            ("file", Some("companies.csv"), "Acme\nGlobex\n"),
        ])
        .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        let job_id = body["job_id"].as_str().unwrap().to_string();

        let mut state = String::new();
        for _ in 0..400 {
            let req = test::TestRequest::get()
                .uri(&format!("/api/status/{}", job_id))
                .to_request();
            let job: serde_json::Value = test::call_and_read_body_json(&app, req).await;
            state = job["status"].as_str().unwrap_or_default().to_string();
            if state == "completed" || state == "failed" {
                assert_eq!(job["records"].as_array().map(Vec::len), Some(2));
                break;
            }
            actix_web::rt::time::sleep(Duration::from_millis(25)).await;
        }
        assert_eq!(state, "completed");

        let req = test::TestRequest::get()
            .uri(&format!("/api/download/{}", job_id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get(header::CONTENT_TYPE).unwrap(), EXPORT_MIME);
        assert_eq!(
            resp.headers().get(header::CONTENT_DISPOSITION).unwrap(),
            "attachment; filename=\"annual_reports.csv\""
        );
        let text = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
        assert!(text.starts_with("Company,Official Website,Annual Report URL,Status"));
        assert_eq!(text.lines().count(), 3);
        assert!(!text.contains("server-secret"));
    }

    #[actix_web::test]
    async fn test_download_before_completion_conflicts() {
        // The courtesy delay keeps the job running after its first company.
        let app = test::init_service(
            App::new().app_data(state_with_delay(60_000)).configure(app_config),
        )
        .await;
        let req = upload_request(&[
            ("api_key", None, "key"),
            ("file", Some("companies.csv"), "Acme\nGlobex\n"),
        ])
        .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        let job_id = body["job_id"].as_str().unwrap().to_string();

        let req = test::TestRequest::get()
            .uri(&format!("/api/download/{}", job_id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let message: String = test::read_body_json(resp).await;
        assert_eq!(message, "Results not ready yet.");
    }
}
