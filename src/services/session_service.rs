// src/services/session_service.rs
//! Ciclo de vida das sessões de chamada: criar -> aceitar leituras de QR -> fechar -> relatório.
//!
//! A marcação dentro da sessão (`sessions/<id>/attendees/<chave>`) é a cópia de referência
//! e é gravada com `put_if_absent`. As cópias em `attendance/` e `teachers/<uid>/attendance/`
//! e a atualização do aluno são projeções diferidas: têm chaves fixas por marcação, são
//! repetidas algumas vezes e as falhas ficam só no log.

use crate::{
    config::{AckMode, ScanPolicy},
    error::{AppError, AppResult},
    models::{
        attendance::AttendanceRecord,
        session::{
            attendee_key, legacy_attendees, AttendanceMark, CreatedSession,
            MarkAttendanceRequest, NewSession, Session, SessionAttendance, SessionStatus,
        },
    },
    services::{
        attendance_service::ATTENDANCE_PATH,
        broadcaster::{Broadcaster, LiveEvent},
        enrollment_service,
        records::{self, now_iso},
        student_service,
    },
    store::{tree, KvStore, StoreResult},
};
use serde_json::{Map, Value};
use std::{future::Future, sync::Arc, time::Duration};

pub const SESSIONS_PATH: &str = "sessions";

const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn KvStore>,
    broadcaster: Broadcaster,
    ack_mode: AckMode,
    scan_policy: ScanPolicy,
}

impl SessionService {
    pub fn new(store: Arc<dyn KvStore>, broadcaster: Broadcaster, ack_mode: AckMode, scan_policy: ScanPolicy) -> Self {
        Self {
            store,
            broadcaster,
            ack_mode,
            scan_policy,
        }
    }

    /// Cria uma sessão ativa e devolve o ID e o link do QR.
    ///
    /// Em `AckMode::Optimistic` a escrita corre em segundo plano: um `get` logo a seguir
    /// pode ainda não encontrar a sessão.
    pub async fn create(&self, input: NewSession, base_url: &str) -> AppResult<CreatedSession> {
        let course_id = records::required(input.course_id, "courseId")?;
        let teacher_id = records::required(input.teacher_id, "teacherId")?;

        let session_id = uuid::Uuid::new_v4().simple().to_string();
        let qr_url = format!("{}/scan?sessionId={}", base_url.trim_end_matches('/'), session_id);
        let session = Session {
            session_id: session_id.clone(),
            course_id,
            course_name: input.course_name,
            teacher_id,
            teacher_name: input.teacher_name,
            qr_url: qr_url.clone(),
            status: SessionStatus::Active,
            created_at: now_iso(),
            closed_at: None,
            attendees: Default::default(),
        };
        let value = serde_json::to_value(&session).map_err(|e| {
            tracing::error!("Erro ao serializar sessão: {:?}", e);
            AppError::Internal
        })?;
        let path = format!("{}/{}", SESSIONS_PATH, session_id);

        match self.ack_mode {
            AckMode::Sync => {
                write_with_retry(self.store.as_ref(), &path, &value).await?;
            }
            AckMode::Optimistic => {
                let store = self.store.clone();
                let path = path.clone();
                tokio::spawn(async move {
                    if let Err(e) = write_with_retry(store.as_ref(), &path, &value).await {
                        tracing::error!("❌ Sessão '{}' não foi gravada: {}", path, e);
                    }
                });
            }
        }

        tracing::info!(
            "✅ Sessão {} criada (unidade {}, docente {})",
            session.session_id,
            session.course_id,
            session.teacher_id
        );
        Ok(CreatedSession { session_id, qr_url })
    }

    pub async fn get(&self, session_id: &str) -> AppResult<Option<Session>> {
        let path = records::record_path(SESSIONS_PATH, session_id)?;
        Ok(self.read_session(&path).await?.map(|(session, _)| session))
    }

    /// Todas as sessões (ativas e fechadas), mais recentes primeiro.
    pub async fn list(&self) -> AppResult<Vec<Session>> {
        let Some(Value::Object(children)) = self.store.read(SESSIONS_PATH).await? else {
            return Ok(Vec::new());
        };

        let mut sessions = Vec::with_capacity(children.len());
        for (key, mut value) in children {
            if let Value::Object(fields) = &mut value {
                fields.entry("sessionId").or_insert_with(|| Value::String(key.clone()));
            }
            match serde_json::from_value::<Session>(value) {
                Ok(session) => sessions.push(session),
                Err(e) => tracing::warn!("Sessão '{}' ignorada: {}", key, e),
            }
        }
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    /// Fecha a sessão. Fechar uma sessão já fechada não altera nada e devolve-a como está.
    pub async fn close(&self, session_id: &str) -> AppResult<Session> {
        let path = records::record_path(SESSIONS_PATH, session_id)?;
        let (mut session, _) = self
            .read_session(&path)
            .await?
            .ok_or_else(|| AppError::not_found("Sessão"))?;

        if !session.is_active() {
            tracing::debug!("Sessão {} já estava fechada.", session_id);
            return Ok(session);
        }

        let closed_at = now_iso();
        let mut fields = Map::new();
        fields.insert("status".to_string(), Value::String("closed".to_string()));
        fields.insert("closedAt".to_string(), Value::String(closed_at.clone()));
        self.store.update(&path, fields).await?;

        session.status = SessionStatus::Closed;
        session.closed_at = Some(closed_at);
        tracing::info!("🔒 Sessão {} fechada com {} presenças.", session_id, session.attendees.len());
        self.broadcaster.publish(LiveEvent::new("session", session.report()));
        Ok(session)
    }

    /// Relatório da sessão; `NotFound` se não existir.
    pub async fn report(&self, session_id: &str) -> AppResult<SessionAttendance> {
        self.get(session_id)
            .await?
            .map(|session| session.report())
            .ok_or_else(|| AppError::not_found("Sessão"))
    }

    /// Regista a leitura de QR de um aluno numa sessão ativa.
    pub async fn mark(&self, session_id: &str, request: MarkAttendanceRequest) -> AppResult<AttendanceMark> {
        if session_id.trim().is_empty() {
            return Err(AppError::Validation("sessionId é obrigatório".to_string()));
        }
        let student_id = clean(request.student_id);
        let student_name = clean(request.student_name);
        let key = attendee_key(student_id.as_deref(), student_name.as_deref())
            .ok_or_else(|| AppError::Validation("studentId ou studentName é obrigatório".to_string()))?;

        let path = records::record_path(SESSIONS_PATH, session_id)?;
        let (mut session, raw_attendees) = self
            .read_session(&path)
            .await?
            .ok_or_else(|| AppError::not_found("Sessão"))?;

        if !session.is_active() {
            tracing::debug!("Leitura recusada: sessão {} fechada.", session_id);
            return Err(AppError::SessionClosed);
        }

        if self.scan_policy == ScanPolicy::EnrollmentRequired {
            self.ensure_enrolled(student_id.as_deref(), &session.course_id).await?;
        }

        if session.has_attendee(&key, student_id.as_deref()) {
            return Err(duplicate());
        }

        let attendees_path = format!("{}/attendees", path);
        self.migrate_legacy_attendees(&attendees_path, raw_attendees.as_ref()).await?;

        let mark = AttendanceMark {
            student_id: student_id.clone(),
            student_name: student_name.clone(),
            student_email: clean(request.student_email),
            student_phone: clean(request.student_phone),
            marked_at: now_iso(),
        };
        let mark_value = serde_json::to_value(&mark).map_err(|e| {
            tracing::error!("Erro ao serializar marcação: {:?}", e);
            AppError::Internal
        })?;
        let inserted = self
            .store
            .put_if_absent(&format!("{}/{}", attendees_path, key), mark_value)
            .await?;
        if !inserted {
            return Err(duplicate());
        }
        tracing::info!(
            "✅ Presença marcada na sessão {}: {}",
            session_id,
            mark.student_name.as_deref().or(mark.student_id.as_deref()).unwrap_or(&key)
        );

        session.attendees.insert(key.clone(), mark.clone());
        self.broadcaster.publish(LiveEvent::new("session", session.report()));

        let projection = MarkProjection::new(&session, key, mark.clone());
        let store = self.store.clone();
        let broadcaster = self.broadcaster.clone();
        match self.ack_mode {
            AckMode::Sync => projection.run(store, broadcaster).await,
            AckMode::Optimistic => {
                tokio::spawn(projection.run(store, broadcaster));
            }
        }

        Ok(mark)
    }

    /// Move cada marcação antiga para a sua chave canónica, uma a uma.
    /// Nunca reescreve `attendees` inteiro: marcações de outros pedidos ficam intactas.
    async fn migrate_legacy_attendees(&self, attendees_path: &str, raw: Option<&Value>) -> AppResult<()> {
        let legacy = legacy_attendees(raw);
        if legacy.is_empty() {
            return Ok(());
        }
        for entry in &legacy {
            self.store
                .put_if_absent(&format!("{}/{}", attendees_path, entry.key), entry.value.clone())
                .await?;
            self.store
                .delete(&format!("{}/{}", attendees_path, entry.stored_key))
                .await?;
        }
        tracing::info!("{} marcações em '{}' migradas para o formato por chave.", legacy.len(), attendees_path);
        Ok(())
    }

    async fn ensure_enrolled(&self, student_id: Option<&str>, course_id: &str) -> AppResult<()> {
        let student_id = student_id
            .ok_or_else(|| AppError::Validation("studentId é obrigatório nesta unidade curricular".to_string()))?;
        let enrollment = enrollment_service::find_by_student_and_course(self.store.as_ref(), student_id, course_id).await?;
        match enrollment {
            Some(e) if e.is_active() => Ok(()),
            _ => {
                tracing::debug!("Leitura recusada: {} não está inscrito em {}", student_id, course_id);
                Err(AppError::NotEnrolled)
            }
        }
    }

    /// Lê a sessão e devolve também os attendees tal como estão guardados.
    async fn read_session(&self, path: &str) -> AppResult<Option<(Session, Option<Value>)>> {
        let Some(mut value) = self.store.read(path).await? else {
            return Ok(None);
        };
        let raw_attendees = value.get("attendees").cloned();
        if let Value::Object(fields) = &mut value {
            if let Some(id) = path.rsplit('/').next() {
                fields.entry("sessionId").or_insert_with(|| Value::String(id.to_string()));
            }
        }
        let session = serde_json::from_value(value).map_err(|e| {
            tracing::error!("Sessão ilegível em '{}': {}", path, e);
            AppError::Internal
        })?;
        Ok(Some((session, raw_attendees)))
    }
}

fn clean(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn duplicate() -> AppError {
    AppError::Conflict("Presença já registada nesta sessão".to_string())
}

/// Trabalho diferido de uma marcação, com as chaves fixadas no momento da marcação.
struct MarkProjection {
    global_path: String,
    teacher_path: Option<String>,
    record: AttendanceRecord,
    mark: AttendanceMark,
}

impl MarkProjection {
    fn new(session: &Session, key: String, mark: AttendanceMark) -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        let global_path = format!("{}/{}_{}_{}", ATTENDANCE_PATH, millis, session.session_id, key);
        let teacher_path = tree::is_valid_key(&session.teacher_id)
            .then(|| format!("teachers/{}/attendance/{}_{}", session.teacher_id, millis, key));

        let record = AttendanceRecord {
            id: format!("{}_{}_{}", millis, session.session_id, key),
            student_id: mark.student_id.clone(),
            course_id: Some(session.course_id.clone()),
            student_name: mark.student_name.clone(),
            timestamp: Some(millis),
            student_dni: None,
            recorded_at: None,
            session_id: Some(session.session_id.clone()),
            course_name: session.course_name.clone(),
            teacher_id: Some(session.teacher_id.clone()),
            student_email: mark.student_email.clone(),
            student_phone: mark.student_phone.clone(),
            marked_at: Some(mark.marked_at.clone()),
        };
        Self {
            global_path,
            teacher_path,
            record,
            mark,
        }
    }

    /// Corre as cópias e a atualização do aluno. Nunca falha: erros vão para o log.
    async fn run(self, store: Arc<dyn KvStore>, broadcaster: Broadcaster) {
        let store = store.as_ref();
        let value = match serde_json::to_value(&self.record) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("Erro ao serializar cópia da presença: {:?}", e);
                return;
            }
        };

        if let Err(e) = write_with_retry(store, &self.global_path, &value).await {
            tracing::error!("❌ Cópia global da presença falhou ({}): {}", self.global_path, e);
        }
        match &self.teacher_path {
            Some(path) => {
                if let Err(e) = write_with_retry(store, path, &value).await {
                    tracing::error!("❌ Cópia da presença do docente falhou ({}): {}", path, e);
                }
            }
            None => tracing::warn!("Docente '{}' com ID inválido; cópia por docente ignorada.", self.record.teacher_id.as_deref().unwrap_or_default()),
        }

        let Some(student_id) = self.mark.student_id.as_deref() else {
            return;
        };
        let upsert = retry("atualização do aluno", || {
            student_service::upsert_from_scan(
                store,
                student_id,
                self.mark.student_name.as_deref(),
                self.mark.student_email.as_deref(),
                self.mark.student_phone.as_deref(),
            )
        })
        .await;
        match upsert {
            Ok(_) => match student_service::list_students(store).await {
                Ok(roster) => {
                    broadcaster.publish(LiveEvent::new("students", roster));
                }
                Err(e) => tracing::warn!("Lista de alunos não enviada aos clientes: {}", e),
            },
            Err(e) => tracing::error!("❌ Atualização do aluno {} falhou: {}", student_id, e),
        }
    }
}

async fn write_with_retry(store: &dyn KvStore, path: &str, value: &Value) -> StoreResult {
    let mut attempt = 1;
    loop {
        match store.write(path, value.clone()).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt < MAX_ATTEMPTS => {
                tracing::warn!("Escrita em '{}' falhou (tentativa {}): {}", path, attempt, e);
                tokio::time::sleep(RETRY_BASE_DELAY * 2u32.pow(attempt - 1)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn retry<T, F, Fut>(what: &str, mut op: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < MAX_ATTEMPTS => {
                tracing::warn!("{} falhou (tentativa {}): {}", what, attempt, e);
                tokio::time::sleep(RETRY_BASE_DELAY * 2u32.pow(attempt - 1)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enrollment::NewEnrollment;
    use crate::store::SqliteStore;
    use serde_json::json;

    async fn service(ack_mode: AckMode, scan_policy: ScanPolicy) -> (SessionService, Arc<dyn KvStore>) {
        let store: Arc<dyn KvStore> = Arc::new(SqliteStore::in_memory().await.unwrap());
        let service = SessionService::new(store.clone(), Broadcaster::default(), ack_mode, scan_policy);
        (service, store)
    }

    fn new_session() -> NewSession {
        NewSession {
            course_id: Some("MATH101".into()),
            course_name: Some("Matemática".into()),
            teacher_id: Some("T1".into()),
            teacher_name: Some("Prof. Silva".into()),
        }
    }

    fn scan(student_id: &str, name: &str) -> MarkAttendanceRequest {
        MarkAttendanceRequest {
            student_id: Some(student_id.into()),
            student_name: Some(name.into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn full_lifecycle() {
        let (service, _) = service(AckMode::Sync, ScanPolicy::Open).await;
        let created = service.create(new_session(), "http://localhost:5000").await.unwrap();
        assert_eq!(
            created.qr_url,
            format!("http://localhost:5000/scan?sessionId={}", created.session_id)
        );

        service.mark(&created.session_id, scan("S1", "Ana")).await.unwrap();
        let report = service.report(&created.session_id).await.unwrap();
        assert_eq!(report.total_attendees, 1);
        assert_eq!(report.attendees[0].student_name.as_deref(), Some("Ana"));

        let closed = service.close(&created.session_id).await.unwrap();
        assert_eq!(closed.status, SessionStatus::Closed);

        let err = service.mark(&created.session_id, scan("S2", "Rui")).await.unwrap_err();
        assert!(matches!(err, AppError::SessionClosed));
        assert_eq!(service.report(&created.session_id).await.unwrap().total_attendees, 1);
    }

    #[tokio::test]
    async fn create_requires_course_and_teacher() {
        let (service, _) = service(AckMode::Sync, ScanPolicy::Open).await;
        let input = NewSession {
            teacher_id: None,
            ..new_session()
        };
        assert!(matches!(service.create(input, "http://x").await, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn closing_twice_keeps_first_closed_at() {
        let (service, _) = service(AckMode::Sync, ScanPolicy::Open).await;
        let created = service.create(new_session(), "http://x").await.unwrap();
        let first = service.close(&created.session_id).await.unwrap();
        let second = service.close(&created.session_id).await.unwrap();
        assert_eq!(first.closed_at, second.closed_at);
        assert!(matches!(service.close("missing").await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn serialized_duplicate_is_rejected() {
        let (service, _) = service(AckMode::Sync, ScanPolicy::Open).await;
        let created = service.create(new_session(), "http://x").await.unwrap();
        service.mark(&created.session_id, scan("S1", "Ana")).await.unwrap();
        let err = service.mark(&created.session_id, scan("S1", "Ana")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn concurrent_duplicates_write_one_mark() {
        let (service, _) = service(AckMode::Sync, ScanPolicy::Open).await;
        let created = service.create(new_session(), "http://x").await.unwrap();
        let id = created.session_id.as_str();

        let (a, b) = tokio::join!(service.mark(id, scan("S1", "Ana")), service.mark(id, scan("S1", "Ana")));
        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
        assert_eq!(service.report(id).await.unwrap().total_attendees, 1);
    }

    #[tokio::test]
    async fn mark_writes_projections_and_upserts_student() {
        let (service, store) = service(AckMode::Sync, ScanPolicy::Open).await;
        let created = service.create(new_session(), "http://x").await.unwrap();
        service.mark(&created.session_id, scan("S1", "Ana")).await.unwrap();

        let global: Vec<AttendanceRecord> = records::fetch_all(store.as_ref(), ATTENDANCE_PATH).await.unwrap();
        assert_eq!(global.len(), 1);
        assert_eq!(global[0].session_id.as_deref(), Some(created.session_id.as_str()));

        let teacher = store.read("teachers/T1/attendance").await.unwrap().unwrap();
        assert_eq!(teacher.as_object().unwrap().len(), 1);

        let student = student_service::find_student_by_student_id(store.as_ref(), "S1").await.unwrap().unwrap();
        assert_eq!(student.name, "Ana");
    }

    #[tokio::test]
    async fn name_only_scan_is_keyed_by_name() {
        let (service, store) = service(AckMode::Sync, ScanPolicy::Open).await;
        let created = service.create(new_session(), "http://x").await.unwrap();
        let request = MarkAttendanceRequest {
            student_name: Some("Ana Paula".into()),
            ..Default::default()
        };
        service.mark(&created.session_id, request).await.unwrap();

        let path = format!("sessions/{}/attendees/%nome-ana paula", created.session_id);
        assert!(store.read(&path).await.unwrap().is_some());
        // Sem número de aluno não há aluno a criar.
        assert!(student_service::list_students(store.as_ref()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn array_attendees_are_migrated_before_marking() {
        let (service, store) = service(AckMode::Sync, ScanPolicy::Open).await;
        store
            .write(
                "sessions/legacy",
                json!({
                    "sessionId": "legacy",
                    "courseId": "MATH101",
                    "teacherId": "T1",
                    "status": "active",
                    "createdAt": "2025-01-01T10:00:00.000Z",
                    "attendees": [{"studentId": "S1", "studentName": "Ana", "markedAt": "2025-01-01T10:01:00.000Z"}]
                }),
            )
            .await
            .unwrap();

        let err = service.mark("legacy", scan("S1", "Ana")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        service.mark("legacy", scan("S2", "Rui")).await.unwrap();
        let attendees = store.read("sessions/legacy/attendees").await.unwrap().unwrap();
        let keys: Vec<&String> = attendees.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["S1", "S2"]);
    }

    /// Store que segura as duas primeiras leituras de uma sessão até ambas terem acontecido.
    struct GatedStore {
        inner: Arc<dyn KvStore>,
        gated_path: String,
        gate: tokio::sync::Barrier,
        reads: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl KvStore for GatedStore {
        fn backend(&self) -> &'static str {
            self.inner.backend()
        }
        async fn read(&self, path: &str) -> StoreResult<Option<Value>> {
            let value = self.inner.read(path).await?;
            if path == self.gated_path
                && self.reads.fetch_add(1, std::sync::atomic::Ordering::SeqCst) < 2
            {
                self.gate.wait().await;
            }
            Ok(value)
        }
        async fn write(&self, path: &str, value: Value) -> StoreResult {
            self.inner.write(path, value).await
        }
        async fn update(&self, path: &str, fields: Map<String, Value>) -> StoreResult {
            self.inner.update(path, fields).await
        }
        async fn delete(&self, path: &str) -> StoreResult {
            self.inner.delete(path).await
        }
        async fn push(&self, path: &str, value: Value) -> StoreResult<String> {
            self.inner.push(path, value).await
        }
        async fn put_if_absent(&self, path: &str, value: Value) -> StoreResult<bool> {
            self.inner.put_if_absent(path, value).await
        }
        fn watch(&self, path: &str) -> crate::store::StoreWatch {
            self.inner.watch(path)
        }
    }

    #[tokio::test]
    async fn concurrent_scans_on_legacy_session_keep_every_mark() {
        let inner: Arc<dyn KvStore> = Arc::new(SqliteStore::in_memory().await.unwrap());
        inner
            .write(
                "sessions/legacy",
                json!({
                    "sessionId": "legacy",
                    "courseId": "MATH101",
                    "teacherId": "T1",
                    "status": "active",
                    "createdAt": "2025-01-01T10:00:00.000Z",
                    "attendees": [{"studentId": "S1", "studentName": "Ana", "markedAt": "2025-01-01T10:01:00.000Z"}]
                }),
            )
            .await
            .unwrap();
        let store: Arc<dyn KvStore> = Arc::new(GatedStore {
            inner: inner.clone(),
            gated_path: "sessions/legacy".to_string(),
            gate: tokio::sync::Barrier::new(2),
            reads: std::sync::atomic::AtomicUsize::new(0),
        });
        let service = SessionService::new(store, Broadcaster::default(), AckMode::Sync, ScanPolicy::Open);

        // Ambas as leituras veem o array antigo antes de qualquer escrita.
        let (rui, eva) = tokio::join!(
            service.mark("legacy", scan("S2", "Rui")),
            service.mark("legacy", scan("S3", "Eva")),
        );
        rui.unwrap();
        eva.unwrap();

        let attendees = inner.read("sessions/legacy/attendees").await.unwrap().unwrap();
        let keys: Vec<&String> = attendees.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["S1", "S2", "S3"]);
        assert_eq!(service.report("legacy").await.unwrap().total_attendees, 3);
    }

    #[tokio::test]
    async fn enrollment_policy_gates_scans() {
        let (service, store) = service(AckMode::Sync, ScanPolicy::EnrollmentRequired).await;
        let created = service.create(new_session(), "http://x").await.unwrap();

        let err = service.mark(&created.session_id, scan("S1", "Ana")).await.unwrap_err();
        assert!(matches!(err, AppError::NotEnrolled));

        enrollment_service::enroll_student(
            store.as_ref(),
            NewEnrollment {
                student_id: Some("S1".into()),
                course_id: Some("MATH101".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        service.mark(&created.session_id, scan("S1", "Ana")).await.unwrap();
    }

    #[tokio::test]
    async fn optimistic_create_is_eventually_visible() {
        let (service, _) = service(AckMode::Optimistic, ScanPolicy::Open).await;
        let created = service.create(new_session(), "http://x").await.unwrap();

        let mut found = None;
        for _ in 0..50 {
            found = service.get(&created.session_id).await.unwrap();
            if found.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(found.map(|s| s.session_id), Some(created.session_id));
    }

    #[tokio::test]
    async fn list_returns_active_and_closed() {
        let (service, _) = service(AckMode::Sync, ScanPolicy::Open).await;
        let a = service.create(new_session(), "http://x").await.unwrap();
        service.create(new_session(), "http://x").await.unwrap();
        service.close(&a.session_id).await.unwrap();

        let sessions = service.list().await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions.iter().filter(|s| s.is_active()).count(), 1);
    }

    #[tokio::test]
    async fn mark_publishes_session_report() {
        let (service, _) = service(AckMode::Sync, ScanPolicy::Open).await;
        let mut client = service.broadcaster.subscribe();
        let created = service.create(new_session(), "http://x").await.unwrap();
        service.mark(&created.session_id, scan("S1", "Ana")).await.unwrap();

        let event = client.recv().await.unwrap();
        assert_eq!(event.name, "session");
        assert_eq!(event.data["totalAttendees"], 1);
        assert_eq!(client.recv().await.unwrap().name, "students");
    }
}
