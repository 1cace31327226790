use actix_cors::Cors;
use actix_web::{web, App, HttpResponse, HttpServer, Result as ActixResult};
use diplomarec_core::{Error, Mention, QueryFeatures};
use diplomarec_engine::{Recommendation, RecommendationEngine, RetrainOutcome};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

/// `Filiere` arrives either as one string or as a list
#[derive(Deserialize, Debug, Default)]
#[serde(untagged)]
enum OneOrMany {
    #[default]
    Empty,
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::Empty => Vec::new(),
            OneOrMany::One(value) if value.trim().is_empty() => Vec::new(),
            OneOrMany::One(value) => vec![value.trim().to_string()],
            OneOrMany::Many(values) => values,
        }
    }
}

#[derive(Deserialize, Debug)]
struct StudentProfile {
    #[serde(rename = "Matieres_Etudiant", default)]
    subjects: Vec<String>,
    #[serde(rename = "Career", default)]
    careers: Vec<String>,
    #[serde(rename = "Filiere", default)]
    fields: OneOrMany,
    #[serde(rename = "Durée", default)]
    duration: Option<u32>,
    #[serde(rename = "Mention_Bac", default)]
    mention: Option<String>,
}

impl StudentProfile {
    /// Shape checks that do not need the fitted vocabularies
    fn errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.duration == Some(0) {
            errors.push("Durée: must be at least 1".to_string());
        }
        if let Some(mention) = self.mention() {
            if Mention::parse(mention).is_none() {
                errors.push(format!("Mention_Bac: unknown value {:?}", mention));
            }
        }
        errors
    }

    /// Blank counts as absent
    fn mention(&self) -> Option<&str> {
        self.mention.as_deref().filter(|m| !m.trim().is_empty())
    }

    fn into_query(self) -> QueryFeatures {
        let mention = self.mention().map(str::to_string);
        QueryFeatures {
            subjects: self.subjects,
            careers: self.careers,
            fields: self.fields.into_vec(),
            duration: self.duration,
            mention,
        }
    }
}

#[derive(Serialize, Debug)]
struct RecommendationResponse {
    #[serde(rename = "Nom_Diplôme")]
    name: String,
    #[serde(rename = "Ecole")]
    school: String,
    #[serde(rename = "Ville")]
    city: String,
    #[serde(rename = "Durée")]
    duration: u32,
    #[serde(rename = "Matieres_Diplome")]
    taught_subjects: Vec<String>,
    #[serde(rename = "Ancienne_Diplome")]
    prerequisites: Vec<String>,
    #[serde(rename = "Employement_Opportunities")]
    employment_opportunities: Vec<String>,
    #[serde(rename = "Matieres_Etudiant")]
    subjects: Vec<String>,
    #[serde(rename = "Career")]
    careers: Vec<String>,
    #[serde(rename = "Filiere")]
    fields: Vec<String>,
    #[serde(rename = "Mention_Bac")]
    mention: String,
    match_percentage: f32,
}

impl From<Recommendation> for RecommendationResponse {
    fn from(r: Recommendation) -> Self {
        Self {
            name: r.name,
            school: r.school,
            city: r.city,
            duration: r.duration,
            taught_subjects: r.taught_subjects,
            prerequisites: r.prerequisites,
            employment_opportunities: r.employment_opportunities,
            subjects: r.subjects,
            careers: r.careers,
            fields: r.fields,
            mention: r.mention,
            match_percentage: (r.match_percentage * 100.0).round() / 100.0,
        }
    }
}

#[derive(Serialize)]
struct ValidationResponse {
    valid: bool,
    diagnostics: Vec<String>,
}

#[derive(Deserialize)]
struct RetrainParams {
    #[serde(default)]
    background: bool,
}

pub struct RestApi;

impl RestApi {
    pub async fn start(engine: Arc<RecommendationEngine>, port: u16) -> std::io::Result<()> {
        HttpServer::new(move || {
            let cors = Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
                .max_age(3600);

            App::new()
                .wrap(cors)
                .app_data(web::Data::new(engine.clone()))
                .configure(configure)
        })
        .bind(("0.0.0.0", port))?
        .run()
        .await
    }
}

/// Register all routes; the app must carry `web::Data<Arc<RecommendationEngine>>`
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/recommend", web::post().to(recommend))
        .route("/api/validate", web::post().to(validate))
        .route("/api/retrain", web::get().to(retrain))
        .route("/healthz", web::get().to(healthz))
        .route("/readyz", web::get().to(readyz));
}

async fn recommend(
    engine: web::Data<Arc<RecommendationEngine>>,
    req: web::Json<StudentProfile>,
) -> ActixResult<HttpResponse> {
    let profile = req.into_inner();
    let errors = profile.errors();
    if !errors.is_empty() {
        return Ok(HttpResponse::BadRequest().json(serde_json::json!({
            "error": "Invalid input",
            "diagnostics": errors
        })));
    }

    let query = profile.into_query();
    let validation = match engine.validate(&query) {
        Ok(validation) => validation,
        Err(e) => return Ok(failure(e)),
    };
    if !validation.is_valid {
        warn!("Rejected query: {}", validation.diagnostics.join(", "));
        return Ok(HttpResponse::BadRequest().json(serde_json::json!({
            "error": "Invalid input",
            "diagnostics": validation.diagnostics
        })));
    }

    let engine = engine.get_ref().clone();
    let result = web::block(move || engine.recommend(&query)).await;

    match result {
        Ok(Ok(recommendations)) => {
            let body: Vec<RecommendationResponse> =
                recommendations.into_iter().map(Into::into).collect();
            Ok(HttpResponse::Ok().json(body))
        }
        Ok(Err(e)) => Ok(failure(e)),
        Err(e) => Ok(HttpResponse::InternalServerError().json(serde_json::json!({
            "error": e.to_string()
        }))),
    }
}

async fn validate(
    engine: web::Data<Arc<RecommendationEngine>>,
    req: web::Json<StudentProfile>,
) -> ActixResult<HttpResponse> {
    let profile = req.into_inner();
    let mut diagnostics = profile.errors();
    match engine.validate(&profile.into_query()) {
        Ok(validation) => diagnostics.extend(validation.diagnostics),
        Err(e) => return Ok(failure(e)),
    }

    Ok(HttpResponse::Ok().json(ValidationResponse {
        valid: diagnostics.is_empty(),
        diagnostics,
    }))
}

async fn retrain(
    engine: web::Data<Arc<RecommendationEngine>>,
    params: web::Query<RetrainParams>,
) -> ActixResult<HttpResponse> {
    if params.background {
        let queued = engine.spawn_retrain();
        info!("Background retrain requested (queued: {})", queued);
        return Ok(HttpResponse::Accepted().json(serde_json::json!({
            "message": "Retrain scheduled",
            "queued": queued
        })));
    }

    let engine = engine.get_ref().clone();
    let result = web::block(move || engine.retrain()).await;

    match result {
        Ok(Ok(outcome)) => {
            let retrained = matches!(outcome, RetrainOutcome::Retrained { .. });
            Ok(HttpResponse::Ok().json(serde_json::json!({
                "message": outcome.to_string(),
                "retrained": retrained
            })))
        }
        Ok(Err(e)) => {
            error!("Retrain failed: {}", e);
            Ok(HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Retrain failed: {}", e)
            })))
        }
        Err(e) => Ok(HttpResponse::InternalServerError().json(serde_json::json!({
            "error": e.to_string()
        }))),
    }
}

fn failure(e: Error) -> HttpResponse {
    match e {
        Error::NotReady(state) => HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "error": format!("Engine not ready: {}", state)
        })),
        e => {
            error!("Request failed: {}", e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": e.to_string()
            }))
        }
    }
}

async fn healthz() -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(serde_json::json!({ "status": "ok" })))
}

async fn readyz(engine: web::Data<Arc<RecommendationEngine>>) -> ActixResult<HttpResponse> {
    let status = engine.status();
    if status.state.is_serving() {
        Ok(HttpResponse::Ok().json(status))
    } else {
        Ok(HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "state": status.state.to_string()
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test};
    use diplomarec_core::ProgramRecord;
    use diplomarec_engine::{EngineConfig, MemorySource};
    use tempfile::TempDir;

    fn engine(dir: &TempDir) -> (Arc<MemorySource>, Arc<RecommendationEngine>) {
        let source = Arc::new(MemorySource::new(vec![
            ProgramRecord::new("Licence Physique", "FS Rabat")
                .with_duration(3)
                .with_city("Rabat")
                .with_mention("Bien")
                .with_subjects(["Physique", "Chimie"])
                .with_careers(["Physicien"])
                .with_fields(["SP"]),
            ProgramRecord::new("DUT Informatique", "EST Salé")
                .with_duration(2)
                .with_city("Salé")
                .with_subjects(["Maths"])
                .with_careers(["Développeur"])
                .with_fields(["SM"]),
        ]));
        let mut config = EngineConfig::default().with_model_path(dir.path().join("model.bin"));
        config.training.hidden_dim = 8;
        config.training.embedding_dim = 4;
        let engine = RecommendationEngine::new(source.clone(), config).unwrap();
        (source, Arc::new(engine))
    }

    macro_rules! app {
        ($engine:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($engine.clone()))
                    .configure(configure),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_recommend_returns_original_keys() {
        let dir = TempDir::new().unwrap();
        let (_, engine) = engine(&dir);
        let app = app!(engine);

        let req = test::TestRequest::post()
            .uri("/api/recommend")
            .set_json(serde_json::json!({
                "Matieres_Etudiant": ["Physique"],
                "Career": [],
                "Filiere": "SP",
                "Durée": 3,
                "Mention_Bac": "Très Bien"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(resp).await;
        let items = body.as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["Nom_Diplôme"], "Licence Physique");
        assert_eq!(items[0]["Ecole"], "FS Rabat");
        assert_eq!(items[0]["Ville"], "Rabat");
        assert_eq!(items[0]["Durée"], 3);
        assert!(items[0]["match_percentage"].is_number());
    }

    #[actix_web::test]
    async fn test_recommend_accepts_field_list_and_missing_duration() {
        let dir = TempDir::new().unwrap();
        let (_, engine) = engine(&dir);
        let app = app!(engine);

        let req = test::TestRequest::post()
            .uri("/api/recommend")
            .set_json(serde_json::json!({
                "Matieres_Etudiant": [],
                "Career": [],
                "Filiere": ["SP", "SM"]
            }))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.as_array().unwrap().len(), 2);
    }

    #[actix_web::test]
    async fn test_recommend_rejects_unknown_subject() {
        let dir = TempDir::new().unwrap();
        let (_, engine) = engine(&dir);
        let app = app!(engine);

        let req = test::TestRequest::post()
            .uri("/api/recommend")
            .set_json(serde_json::json!({
                "Matieres_Etudiant": ["Latin"],
                "Career": [],
                "Filiere": "SP"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["diagnostics"][0], "Subject: Latin");
    }

    #[actix_web::test]
    async fn test_recommend_rejects_zero_duration_and_bad_mention() {
        let dir = TempDir::new().unwrap();
        let (_, engine) = engine(&dir);
        let app = app!(engine);

        let req = test::TestRequest::post()
            .uri("/api/recommend")
            .set_json(serde_json::json!({
                "Filiere": "SP",
                "Durée": 0,
                "Mention_Bac": "Excellent"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["diagnostics"].as_array().unwrap().len(), 2);
    }

    #[actix_web::test]
    async fn test_recommend_accepts_blank_mention() {
        let dir = TempDir::new().unwrap();
        let (_, engine) = engine(&dir);
        let app = app!(engine);

        let req = test::TestRequest::post()
            .uri("/api/recommend")
            .set_json(serde_json::json!({
                "Filiere": "SP",
                "Mention_Bac": ""
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body[0]["Nom_Diplôme"], "Licence Physique");

        let profile: StudentProfile =
            serde_json::from_value(serde_json::json!({ "Mention_Bac": "  " })).unwrap();
        assert!(profile.errors().is_empty());
        assert_eq!(profile.into_query().mention, None);
    }

    #[actix_web::test]
    async fn test_validate_endpoint() {
        let dir = TempDir::new().unwrap();
        let (_, engine) = engine(&dir);
        let app = app!(engine);

        let req = test::TestRequest::post()
            .uri("/api/validate")
            .set_json(serde_json::json!({
                "Matieres_Etudiant": ["Maths"],
                "Career": ["Astronaute"],
                "Filiere": "SM"
            }))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["valid"], false);
        assert_eq!(body["diagnostics"][0], "Career: Astronaute");
    }

    #[actix_web::test]
    async fn test_retrain_unchanged_then_changed() {
        let dir = TempDir::new().unwrap();
        let (source, engine) = engine(&dir);
        let app = app!(engine);

        let req = test::TestRequest::get().uri("/api/retrain").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["retrained"], false);
        assert_eq!(
            body["message"],
            "No changes detected in data, no need to retrain the model."
        );

        source.replace(vec![ProgramRecord::new("Master IA", "ENSIAS")
            .with_duration(2)
            .with_subjects(["Maths"])
            .with_fields(["SM"])]);
        let req = test::TestRequest::get().uri("/api/retrain").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["retrained"], true);
        assert_eq!(engine.snapshot().unwrap().records().len(), 1);
    }

    #[actix_web::test]
    async fn test_failed_retrain_is_500_and_keeps_serving() {
        let dir = TempDir::new().unwrap();
        let (source, engine) = engine(&dir);
        let app = app!(engine);

        source.replace(Vec::new());
        let req = test::TestRequest::get().uri("/api/retrain").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let req = test::TestRequest::post()
            .uri("/api/recommend")
            .set_json(serde_json::json!({}))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.as_array().unwrap().len(), 2);
    }

    #[actix_web::test]
    async fn test_background_retrain_is_accepted() {
        let dir = TempDir::new().unwrap();
        let (_, engine) = engine(&dir);
        let app = app!(engine);

        let req = test::TestRequest::get()
            .uri("/api/retrain?background=true")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert!(engine.wait_for_retrain(std::time::Duration::from_secs(30)));
    }

    #[actix_web::test]
    async fn test_health_and_readiness() {
        let dir = TempDir::new().unwrap();
        let (_, engine) = engine(&dir);
        let app = app!(engine);

        let req = test::TestRequest::get().uri("/healthz").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::get().uri("/readyz").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["state"], "Ready");
        assert_eq!(body["snapshot"]["programs"], 2);
    }

    #[actix_web::test]
    async fn test_unloaded_engine_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let (source, _) = engine(&dir);
        let mut config = EngineConfig::default().with_model_path(dir.path().join("model.bin"));
        config.training.hidden_dim = 8;
        config.training.embedding_dim = 4;
        let engine = Arc::new(RecommendationEngine::unloaded(source, config).unwrap());
        let app = app!(engine);

        let req = test::TestRequest::get().uri("/readyz").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["state"], "uninitialized");

        let req = test::TestRequest::post()
            .uri("/api/recommend")
            .set_json(serde_json::json!({ "Filiere": "SP" }))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );

        engine.load().unwrap();
        let req = test::TestRequest::get().uri("/readyz").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }
}
