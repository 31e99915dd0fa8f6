//! The ingest pipeline.
//!
//! A submitted document moves through a fixed sequence of stages, each of
//! which either advances the [`IngestJob`] to its next [`IngestState`] or
//! fails the whole ingest. Only the last stage writes to the registry; a
//! failure anywhere else leaves no trace beyond discarded staging content.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use dor_codec::{
    default_dc, ensure_identifier, validate, DocumentFormat, MetsDeserializer, Relationships,
};
use dor_registry::RegistryEntry;
use dor_types::datastream::STAGING_PREFIX;
use dor_types::object::{DC_DATASTREAM_ID, RELS_EXT_DATASTREAM_ID};
use dor_types::{
    now_utc, ComponentState, ControlGroup, Datastream, DigitalObject, LocationKind, MdClass,
    ObjectState,
};

use crate::context::RepositoryContext;
use crate::error::{RepositoryError, RepositoryResult};

/// Label given to a descriptive record created during ingest.
pub const DEFAULT_DC_LABEL: &str = "Dublin Core Metadata";

// ---------------------------------------------------------------------------
// IngestState
// ---------------------------------------------------------------------------

/// How far an ingest has progressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IngestState {
    Received,
    Validated,
    Deserialized,
    Defaulted,
    PidResolved,
    ExistenceChecked,
    DefaultMetadataEnsured,
    RelationshipValidated,
    Registered,
}

// ---------------------------------------------------------------------------
// IngestJob
// ---------------------------------------------------------------------------

/// A document on its way into the repository.
#[derive(Debug)]
pub struct IngestJob {
    pub bytes: Vec<u8>,
    pub format: DocumentFormat,
    pub encoding: String,
    /// Replace the supplied pid unless its namespace is retained.
    pub assign_new_pid: bool,
    pub state: IngestState,
    /// Set once the document has been deserialized.
    pub object: Option<DigitalObject>,
}

impl IngestJob {
    pub fn new(bytes: Vec<u8>, format: DocumentFormat, encoding: &str, assign_new_pid: bool) -> Self {
        Self {
            bytes,
            format,
            encoding: encoding.into(),
            assign_new_pid,
            state: IngestState::Received,
            object: None,
        }
    }

    fn object_mut(&mut self) -> RepositoryResult<&mut DigitalObject> {
        self.object
            .as_mut()
            .ok_or_else(|| RepositoryError::ObjectIntegrity("document not deserialized yet".into()))
    }

    fn staged_ids(&self) -> Vec<String> {
        self.object.as_ref().map(staged_ids).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// IngestStage trait
// ---------------------------------------------------------------------------

/// One step of the ingest pipeline.
pub trait IngestStage: Send + Sync {
    fn name(&self) -> &str;

    /// State the job is in once this stage has run.
    fn reaches(&self) -> IngestState;

    fn run(&self, job: &mut IngestJob, ctx: &RepositoryContext) -> RepositoryResult<()>;
}

/// Time spent in one stage.
#[derive(Clone, Debug)]
pub struct StageTiming {
    pub stage_name: String,
    pub elapsed: Duration,
}

/// A registered object and how long each stage took to get it there.
#[derive(Clone, Debug)]
pub struct IngestOutcome {
    pub object: DigitalObject,
    pub stage_timings: Vec<StageTiming>,
    pub elapsed: Duration,
}

// ---------------------------------------------------------------------------
// IngestPipeline
// ---------------------------------------------------------------------------

/// Ordered ingest stages, run fail-fast.
pub struct IngestPipeline {
    stages: Vec<Box<dyn IngestStage>>,
}

impl IngestPipeline {
    /// An empty pipeline.
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Validate -> Deserialize -> Default -> ResolvePid -> CheckExistence
    /// -> EnsureDefaultMetadata -> ValidateRelationships -> Register
    pub fn with_default_stages() -> Self {
        let mut pipeline = Self::new();
        pipeline.add_stage(Box::new(ValidateStage));
        pipeline.add_stage(Box::new(DeserializeStage));
        pipeline.add_stage(Box::new(DefaultStage));
        pipeline.add_stage(Box::new(ResolvePidStage));
        pipeline.add_stage(Box::new(CheckExistenceStage));
        pipeline.add_stage(Box::new(EnsureDefaultMetadataStage));
        pipeline.add_stage(Box::new(ValidateRelationshipsStage));
        pipeline.add_stage(Box::new(RegisterStage));
        pipeline
    }

    pub fn add_stage(&mut self, stage: Box<dyn IngestStage>) {
        self.stages.push(stage);
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Run every stage over `job`. On failure, content staged by the
    /// deserializer is removed again before the error is returned.
    pub fn run(&self, mut job: IngestJob, ctx: &RepositoryContext) -> RepositoryResult<IngestOutcome> {
        let start = Instant::now();
        let mut stage_timings = Vec::with_capacity(self.stages.len());

        for stage in &self.stages {
            let stage_start = Instant::now();
            if let Err(e) = stage.run(&mut job, ctx) {
                warn!(stage = stage.name(), state = ?job.state, error = %e, "ingest failed");
                discard_staged(&job.staged_ids(), ctx);
                return Err(e);
            }
            job.state = stage.reaches();
            stage_timings.push(StageTiming {
                stage_name: stage.name().to_string(),
                elapsed: stage_start.elapsed(),
            });
            debug!(stage = stage.name(), state = ?job.state, "ingest stage passed");
        }

        let object = job
            .object
            .ok_or_else(|| RepositoryError::ObjectIntegrity("ingest produced no object".into()))?;
        Ok(IngestOutcome {
            object,
            stage_timings,
            elapsed: start.elapsed(),
        })
    }
}

impl Default for IngestPipeline {
    fn default() -> Self {
        Self::with_default_stages()
    }
}

/// Best-effort removal of staged uploads.
pub(crate) fn discard_staged(ids: &[String], ctx: &RepositoryContext) {
    for id in ids {
        if let Err(e) = ctx.staging.remove(id) {
            if !e.is_not_found() {
                warn!(staged_id = %id, error = %e, "could not discard staged content");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// Structural check against the declared format.
pub struct ValidateStage;

impl IngestStage for ValidateStage {
    fn name(&self) -> &str {
        "validate"
    }

    fn reaches(&self) -> IngestState {
        IngestState::Validated
    }

    fn run(&self, job: &mut IngestJob, _ctx: &RepositoryContext) -> RepositoryResult<()> {
        dor_codec::check_encoding(&job.encoding)?;
        validate(&job.bytes, job.format)?;
        Ok(())
    }
}

/// Builds the object graph, staging inline binary content.
pub struct DeserializeStage;

impl IngestStage for DeserializeStage {
    fn name(&self) -> &str {
        "deserialize"
    }

    fn reaches(&self) -> IngestState {
        IngestState::Deserialized
    }

    fn run(&self, job: &mut IngestJob, ctx: &RepositoryContext) -> RepositoryResult<()> {
        let object = MetsDeserializer::new(&job.encoding)?
            .with_staging(ctx.staging.as_ref())
            .with_fetcher(ctx.fetcher.as_ref(), ctx.config.external_query)
            .deserialize_bytes(&job.bytes)?;
        job.object = Some(object);
        Ok(())
    }
}

/// Fills unset states with Active and unset dates with the current time.
pub struct DefaultStage;

impl IngestStage for DefaultStage {
    fn name(&self) -> &str {
        "default"
    }

    fn reaches(&self) -> IngestState {
        IngestState::Defaulted
    }

    fn run(&self, job: &mut IngestJob, _ctx: &RepositoryContext) -> RepositoryResult<()> {
        let now = now_utc();
        let object = job.object_mut()?;
        object.state.get_or_insert(ObjectState::Active);
        let created = *object.created.get_or_insert(now);
        object.last_modified.get_or_insert(created);
        for ds in object.datastreams.values_mut().flatten() {
            ds.state.get_or_insert(ComponentState::Active);
            ds.created.get_or_insert(now);
        }
        for diss in object.disseminators.values_mut().flatten() {
            diss.state.get_or_insert(ComponentState::Active);
            diss.created.get_or_insert(now);
        }
        Ok(())
    }
}

/// Keeps, retains, or replaces the supplied pid.
pub struct ResolvePidStage;

impl IngestStage for ResolvePidStage {
    fn name(&self) -> &str {
        "resolve-pid"
    }

    fn reaches(&self) -> IngestState {
        IngestState::PidResolved
    }

    fn run(&self, job: &mut IngestJob, ctx: &RepositoryContext) -> RepositoryResult<()> {
        let assign_new_pid = job.assign_new_pid;
        let object = job.object_mut()?;
        let supplied = object.pid.clone();
        if assign_new_pid && !ctx.config.retains(supplied.namespace()) {
            let generated = ctx.pid_generator.next_pid(&ctx.config.pid_namespace)?;
            debug!(%supplied, %generated, "assigned new pid");
            object.pid = generated;
        } else {
            ctx.pid_generator.retain(&supplied)?;
        }
        Ok(())
    }
}

/// Fails with `ObjectExists` when the pid is already registered.
pub struct CheckExistenceStage;

impl IngestStage for CheckExistenceStage {
    fn name(&self) -> &str {
        "check-existence"
    }

    fn reaches(&self) -> IngestState {
        IngestState::ExistenceChecked
    }

    fn run(&self, job: &mut IngestJob, ctx: &RepositoryContext) -> RepositoryResult<()> {
        let pid = &job.object_mut()?.pid;
        if ctx.registry.exists(pid)? {
            return Err(RepositoryError::ObjectExists(pid.clone()));
        }
        Ok(())
    }
}

/// Makes sure a `DC` record exists and names the object's pid.
pub struct EnsureDefaultMetadataStage;

impl IngestStage for EnsureDefaultMetadataStage {
    fn name(&self) -> &str {
        "ensure-default-metadata"
    }

    fn reaches(&self) -> IngestState {
        IngestState::DefaultMetadataEnsured
    }

    fn run(&self, job: &mut IngestJob, _ctx: &RepositoryContext) -> RepositoryResult<()> {
        let object = job.object_mut()?;
        let pid = object.pid.clone();

        if object.datastream_versions(DC_DATASTREAM_ID).is_empty() {
            let content = default_dc(&object.label, &pid);
            let mut ds = Datastream::inline_xml(
                DC_DATASTREAM_ID,
                object.next_datastream_version_id(DC_DATASTREAM_ID),
                MdClass::Descriptive,
                DEFAULT_DC_LABEL,
                content,
            );
            if let Some(xml) = ds.xml.as_mut() {
                xml.md_type = "DC".into();
            }
            ds.state = Some(ComponentState::Active);
            ds.created = Some(now_utc());
            object.add_datastream_version(ds)?;
            debug!(%pid, "created default DC record");
            return Ok(());
        }

        let Some(current) = object
            .datastreams
            .get_mut(DC_DATASTREAM_ID)
            .and_then(|versions| versions.last_mut())
        else {
            return Ok(());
        };
        if current.control_group != ControlGroup::InlineXml {
            return Err(RepositoryError::ObjectIntegrity(format!(
                "{DC_DATASTREAM_ID} of {pid} must be inline XML"
            )));
        }
        if let Some(xml) = current.xml.as_mut() {
            if let Some(updated) = ensure_identifier(&xml.content, &pid)? {
                current.size = Some(updated.len() as u64);
                xml.content = updated;
                debug!(%pid, "added pid to DC identifiers");
            }
        }
        Ok(())
    }
}

/// A present `RELS-EXT` must parse and describe this object.
pub struct ValidateRelationshipsStage;

impl IngestStage for ValidateRelationshipsStage {
    fn name(&self) -> &str {
        "validate-relationships"
    }

    fn reaches(&self) -> IngestState {
        IngestState::RelationshipValidated
    }

    fn run(&self, job: &mut IngestJob, _ctx: &RepositoryContext) -> RepositoryResult<()> {
        let object = job.object_mut()?;
        let Some(rels) = object.datastream_as_of(RELS_EXT_DATASTREAM_ID, None) else {
            return Ok(());
        };
        let xml = rels.xml_content().ok_or_else(|| {
            RepositoryError::ObjectIntegrity(format!(
                "{RELS_EXT_DATASTREAM_ID} of {} must be inline XML",
                object.pid
            ))
        })?;
        Relationships::parse(xml)?.check_subject(&object.pid)?;
        Ok(())
    }
}

/// Records the object in the registry under the default owner.
pub struct RegisterStage;

impl IngestStage for RegisterStage {
    fn name(&self) -> &str {
        "register"
    }

    fn reaches(&self) -> IngestState {
        IngestState::Registered
    }

    fn run(&self, job: &mut IngestJob, ctx: &RepositoryContext) -> RepositoryResult<()> {
        let object = job.object_mut()?;
        ctx.registry
            .register(RegistryEntry::for_object(object, ctx.config.default_owner.clone()))?;
        Ok(())
    }
}

/// Staging ids still referenced by any version of `object`.
pub(crate) fn staged_ids(object: &DigitalObject) -> Vec<String> {
    object
        .datastreams
        .values()
        .flatten()
        .filter(|d| d.location_kind() == Some(LocationKind::Staging))
        .filter_map(|d| d.location.as_deref())
        .filter_map(|l| l.strip_prefix(STAGING_PREFIX))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepositoryConfig;
    use dor_codec::{DcRecord, MetsSerializer};
    use dor_types::Pid;

    fn ctx() -> RepositoryContext {
        RepositoryContext::in_memory(RepositoryConfig::default())
    }

    fn document(pid: &str, label: &str) -> Vec<u8> {
        let mut obj = DigitalObject::new(Pid::parse(pid).unwrap(), dor_types::ObjectKind::DataObject);
        obj.label = label.into();
        MetsSerializer::new("UTF-8").unwrap().to_bytes(&obj).unwrap()
    }

    fn job(bytes: Vec<u8>, assign: bool) -> IngestJob {
        IngestJob::new(bytes, DocumentFormat::Mets, "UTF-8", assign)
    }

    #[test]
    fn default_pipeline_has_every_stage() {
        assert_eq!(IngestPipeline::with_default_stages().stage_count(), 8);
    }

    #[test]
    fn fills_defaults_and_registers() {
        let ctx = ctx();
        let outcome = IngestPipeline::with_default_stages()
            .run(job(document("demo:5", "Five"), false), &ctx)
            .unwrap();
        let object = outcome.object;
        assert_eq!(object.state, Some(ObjectState::Active));
        assert!(object.created.is_some());
        assert_eq!(outcome.stage_timings.len(), 8);
        assert!(ctx.registry.exists(&object.pid).unwrap());

        let dc = object.datastream_as_of(DC_DATASTREAM_ID, None).unwrap();
        let record = DcRecord::parse(dc.xml_content().unwrap()).unwrap();
        assert_eq!(record.titles(), vec!["Five".to_string()]);
        assert_eq!(record.identifiers(), vec!["demo:5".to_string()]);
    }

    #[test]
    fn unretained_namespace_gets_generated_pid() {
        let ctx = ctx();
        let outcome = IngestPipeline::with_default_stages()
            .run(job(document("other:5", "x"), true), &ctx)
            .unwrap();
        assert_eq!(outcome.object.pid.namespace(), "changeme");
    }

    #[test]
    fn retained_namespace_keeps_pid() {
        let ctx = ctx();
        let outcome = IngestPipeline::with_default_stages()
            .run(job(document("demo:7", "x"), true), &ctx)
            .unwrap();
        assert_eq!(outcome.object.pid.as_str(), "demo:7");
    }

    #[test]
    fn registered_pid_is_rejected() {
        let ctx = ctx();
        let pipeline = IngestPipeline::with_default_stages();
        pipeline.run(job(document("demo:5", "x"), false), &ctx).unwrap();
        assert!(matches!(
            pipeline.run(job(document("demo:5", "x"), false), &ctx),
            Err(RepositoryError::ObjectExists(_))
        ));
    }

    #[test]
    fn malformed_document_fails_validation() {
        let ctx = ctx();
        let err = IngestPipeline::with_default_stages()
            .run(job(b"<not-mets/>".to_vec(), false), &ctx)
            .unwrap_err();
        assert!(matches!(err, RepositoryError::ObjectIntegrity(_)));
        assert!(ctx.registry.list().unwrap().is_empty());
    }

    #[test]
    fn unsupported_encoding_is_rejected() {
        let ctx = ctx();
        let bytes = document("demo:5", "x");
        let job = IngestJob::new(bytes, DocumentFormat::Mets, "ISO-8859-1", false);
        assert!(IngestPipeline::with_default_stages().run(job, &ctx).is_err());
    }
}
