//! The session manager: readers, writers, ingest, and commit.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use dor_cache::{Clock, ReaderCache, Sweeper, SystemClock};
use dor_codec::{validate, DocumentFormat, MetsSerializer};
use dor_index::{Dependency, FieldQuery, FindObjectsResult};
use dor_registry::RegistryEntry;
use dor_replication::{RecoveryReport, ReplicationCoordinator};
use dor_store::ContentStore;
use dor_types::datastream::{COPY_PREFIX, STAGING_PREFIX};
use dor_types::{now_utc, ControlGroup, DigitalObject, LocationKind, ObjectKind, Pid, Timestamp};

use crate::context::RepositoryContext;
use crate::definitive::{DefinitiveStore, ENCODING};
use crate::error::{RepositoryError, RepositoryResult};
use crate::ingest::{discard_staged, staged_ids, IngestJob, IngestPipeline};
use crate::locks::WriterLocks;
use crate::reader::{ContentSources, Reader, ReaderTier};
use crate::writer::ObjectWriter;

/// Entry point for every read and write against the repository.
pub struct SessionManager {
    ctx: RepositoryContext,
    definitive: Arc<DefinitiveStore>,
    sources: Arc<ContentSources>,
    cache: Arc<ReaderCache<Arc<Reader>>>,
    sweeper: Mutex<Option<Sweeper>>,
    locks: WriterLocks,
    replication: ReplicationCoordinator,
    pipeline: IngestPipeline,
}

impl SessionManager {
    pub fn new(ctx: RepositoryContext) -> Self {
        Self::with_clock(ctx, Arc::new(SystemClock))
    }

    /// A manager whose reader cache ages entries by `clock`.
    pub fn with_clock(ctx: RepositoryContext, clock: Arc<dyn Clock>) -> Self {
        let cache = Arc::new(ReaderCache::with_clock(ctx.config.cache.limits(), clock));
        let sources = Arc::new(ContentSources {
            datastreams: Arc::clone(&ctx.datastreams),
            fetcher: Arc::clone(&ctx.fetcher),
        });
        let replication = ReplicationCoordinator::new(
            Arc::clone(&ctx.jobs),
            Arc::clone(&ctx.fast),
            Arc::clone(&ctx.search),
        );
        Self {
            definitive: Arc::new(DefinitiveStore::new(Arc::clone(&ctx.objects))),
            sources,
            cache,
            sweeper: Mutex::new(None),
            locks: WriterLocks::new(),
            replication,
            pipeline: IngestPipeline::with_default_stages(),
            ctx,
        }
    }

    pub fn context(&self) -> &RepositoryContext {
        &self.ctx
    }

    pub fn definitive(&self) -> &DefinitiveStore {
        &self.definitive
    }

    pub fn cache(&self) -> &ReaderCache<Arc<Reader>> {
        &self.cache
    }

    /// Start the background cache sweeper. Does nothing if it is running.
    pub fn start_sweeper(&self) {
        let mut slot = self.sweeper.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_none() {
            *slot = Some(Sweeper::spawn(
                Arc::clone(&self.cache),
                self.ctx.config.cache.sweep_interval(),
            ));
        }
    }

    pub fn stop_sweeper(&self) {
        let mut slot = self.sweeper.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(mut sweeper) = slot.take() {
            sweeper.stop();
        }
    }

    // ---- Readers ----

    /// A reader for `pid`.
    ///
    /// With [`ReaderTier::Fast`] the cache and then the fast store are
    /// tried first; readers found there are cached. Otherwise, or when the
    /// fast store does not hold the object, the reader works from the
    /// definitive copy.
    pub fn get_reader(&self, pid: &Pid, tier: ReaderTier) -> RepositoryResult<Arc<Reader>> {
        if tier == ReaderTier::Fast {
            if let Some(reader) = self.cache.get(pid) {
                return Ok(reader);
            }
            if self.ctx.fast.contains(pid)? {
                let reader = Arc::new(self.open_reader(pid, ReaderTier::Fast));
                self.cache.put(pid.clone(), Arc::clone(&reader));
                debug!(%pid, "cached fast reader");
                return Ok(reader);
            }
        }
        if !self.definitive.exists(pid)? {
            return Err(RepositoryError::not_found(pid));
        }
        Ok(Arc::new(self.open_reader(pid, ReaderTier::Definitive)))
    }

    pub fn get_bdef_reader(&self, pid: &Pid) -> RepositoryResult<Arc<Reader>> {
        self.typed_reader(pid, ObjectKind::BehaviorDefinition)
    }

    pub fn get_bmech_reader(&self, pid: &Pid) -> RepositoryResult<Arc<Reader>> {
        self.typed_reader(pid, ObjectKind::BehaviorMechanism)
    }

    fn typed_reader(&self, pid: &Pid, kind: ObjectKind) -> RepositoryResult<Arc<Reader>> {
        let reader = self.get_reader(pid, ReaderTier::Fast)?;
        let found = reader.kind()?;
        if found != kind {
            return Err(RepositoryError::ObjectIntegrity(format!(
                "{pid} is a {} not a {}",
                found.document_type(),
                kind.document_type()
            )));
        }
        Ok(reader)
    }

    fn open_reader(&self, pid: &Pid, tier: ReaderTier) -> Reader {
        Reader::new(
            pid.clone(),
            tier,
            Arc::clone(&self.ctx.fast),
            Arc::clone(&self.definitive),
            Arc::clone(&self.sources),
        )
    }

    // ---- Writers ----

    /// An exclusive writer over a committed object.
    pub fn get_writer(&self, pid: &Pid) -> RepositoryResult<ObjectWriter> {
        let guard = self.locks.acquire(pid)?;
        let owner = self.ctx.registry.get_owner(pid)?;
        let object = self.definitive.load(pid)?;
        Ok(ObjectWriter::new(object, owner, false, guard))
    }

    /// Ingest a serialized object and return a writer over it. The object
    /// is registered but stays invisible to readers until committed.
    pub fn get_ingest_writer(
        &self,
        bytes: &[u8],
        format: DocumentFormat,
        encoding: &str,
        assign_new_pid: bool,
    ) -> RepositoryResult<ObjectWriter> {
        let job = IngestJob::new(bytes.to_vec(), format, encoding, assign_new_pid);
        let outcome = self.pipeline.run(job, &self.ctx)?;
        let object = outcome.object;
        let guard = match self.locks.acquire(&object.pid) {
            Ok(guard) => guard,
            Err(e) => {
                self.unregister_quietly(&object.pid);
                discard_staged(&staged_ids(&object), &self.ctx);
                return Err(e);
            }
        };
        info!(pid = %object.pid, elapsed_ms = outcome.elapsed.as_millis() as u64, "ingested object");
        Ok(ObjectWriter::new(object, self.ctx.config.default_owner.clone(), true, guard))
    }

    /// Give a writer back. An ingested object that was never committed is
    /// unregistered again.
    pub fn release_writer(&self, writer: ObjectWriter) {
        if writer.is_new() && !writer.is_committed() {
            debug!(pid = %writer.pid(), "releasing uncommitted ingest");
            self.unregister_quietly(writer.pid());
            discard_staged(&staged_ids(writer.object()), &self.ctx);
        }
    }

    fn unregister_quietly(&self, pid: &Pid) {
        if let Err(e) = self.ctx.registry.unregister(pid) {
            warn!(%pid, error = %e, "could not unregister object");
        }
    }

    // ---- Commit ----

    /// Persist the writer's object, or delete it when `remove` is set.
    pub fn do_commit(
        &self,
        writer: &mut ObjectWriter,
        log_message: &str,
        remove: bool,
    ) -> RepositoryResult<()> {
        if writer.is_removed() {
            return Err(RepositoryError::not_found(writer.pid()));
        }
        info!(pid = %writer.pid(), remove, log_message, "committing");
        if remove {
            self.check_dependents(writer.pid())?;
            self.purge(writer.object())?;
            let purged = writer.take_purged_content();
            self.discard_purged_content(writer.object(), &purged);
            writer.mark_removed();
            return Ok(());
        }

        let is_new = writer.is_new();
        match self.persist(writer.object_mut(), is_new) {
            Ok(()) => {
                let purged = writer.take_purged_content();
                self.discard_purged_content(writer.object(), &purged);
                writer.mark_committed();
                Ok(())
            }
            Err(e) => {
                if is_new {
                    warn!(pid = %writer.pid(), error = %e, "commit of new object failed; removing it");
                    if let Err(cleanup) = self.purge(writer.object()) {
                        warn!(pid = %writer.pid(), error = %cleanup, "compensating remove failed");
                    }
                    writer.mark_removed();
                }
                Err(e)
            }
        }
    }

    /// Fail when other objects' disseminators still use `pid`.
    fn check_dependents(&self, pid: &Pid) -> RepositoryResult<()> {
        let dependents = self
            .ctx
            .fast
            .count_dependents(pid, Dependency::BehaviorDefinition)?
            + self
                .ctx
                .fast
                .count_dependents(pid, Dependency::BehaviorMechanism)?;
        if dependents > 0 {
            return Err(RepositoryError::ObjectDependency {
                pid: pid.clone(),
                dependents,
            });
        }
        Ok(())
    }

    /// Remove every trace of `object`. Storage cleanup is best-effort;
    /// fast store and search index failures propagate and leave a job row.
    fn purge(&self, object: &DigitalObject) -> RepositoryResult<()> {
        let pid = &object.pid;
        for ds in object.datastreams.values().flatten() {
            if ds.control_group != ControlGroup::ManagedContent {
                continue;
            }
            if let Some(LocationKind::Internal) = ds.location_kind() {
                if let Some(location) = ds.location.as_deref() {
                    self.remove_quietly(&*self.ctx.datastreams, location, "managed content");
                }
            }
        }
        discard_staged(&staged_ids(object), &self.ctx);
        self.remove_quietly(&*self.ctx.objects, pid.as_str(), "object document");
        if let Err(e) = self.ctx.registry.unregister(pid) {
            debug!(%pid, error = %e, "registry row already gone");
        }

        self.cache.remove(pid);
        self.replication.delete(pid)?;
        if let Err(e) = self.ctx.resource.delete_object(pid) {
            warn!(%pid, error = %e, "resource index delete failed");
        }
        info!(%pid, "object removed");
        Ok(())
    }

    /// Delete stored bytes of purged managed versions that no surviving
    /// version still points at.
    fn discard_purged_content(&self, object: &DigitalObject, locations: &[String]) {
        let live: HashSet<&str> = object
            .datastreams
            .values()
            .flatten()
            .filter_map(|d| d.location.as_deref())
            .collect();
        for location in locations.iter().filter(|l| !live.contains(l.as_str())) {
            match LocationKind::classify(location) {
                LocationKind::Internal => {
                    self.remove_quietly(&*self.ctx.datastreams, location, "purged content")
                }
                LocationKind::Staging => discard_staged(
                    &[location.trim_start_matches(STAGING_PREFIX).to_string()],
                    &self.ctx,
                ),
                LocationKind::CopyOf | LocationKind::External => {}
            }
        }
    }

    fn remove_quietly(&self, store: &dyn ContentStore, id: &str, what: &str) {
        match store.remove(id) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => debug!(id, what, "already absent"),
            Err(e) => warn!(id, what, error = %e, "could not remove"),
        }
    }

    fn persist(&self, object: &mut DigitalObject, is_new: bool) -> RepositoryResult<()> {
        let staged = self.materialize(object)?;
        object.last_modified = Some(now_utc());

        let bytes = MetsSerializer::new(ENCODING)?.to_bytes(object)?;
        if !self.ctx.config.production {
            validate(&bytes, DocumentFormat::Mets)?;
        }

        let pid = &object.pid;
        if is_new {
            self.ctx.resource.add_object(object)?;
            self.ctx.objects.add(pid.as_str(), &bytes)?;
        } else {
            self.ctx.resource.modify_object(object)?;
            self.ctx.objects.replace(pid.as_str(), &bytes)?;
        }

        let mut entry = self
            .ctx
            .registry
            .get(pid)?
            .unwrap_or_else(|| RegistryEntry::for_object(object, self.ctx.config.default_owner.clone()));
        entry.label = object.label.clone();
        entry.content_model = object.content_model.clone();
        self.ctx.registry.update(&entry)?;
        let version = self.ctx.registry.increment_system_version(pid)?;

        self.cache.remove(pid);
        self.replication.modify(pid, self.definitive.as_ref())?;
        discard_staged(&staged, &self.ctx);
        debug!(%pid, system_version = version, bytes = bytes.len(), "object persisted");
        Ok(())
    }

    /// Copy managed content that is not yet in the datastream store into
    /// it, rewriting each version's location. Returns the staging ids that
    /// were consumed.
    fn materialize(&self, object: &mut DigitalObject) -> RepositoryResult<Vec<String>> {
        let pid = object.pid.clone();
        let mut consumed = Vec::new();
        for ds in object.datastreams.values_mut().flatten() {
            if ds.control_group != ControlGroup::ManagedContent {
                continue;
            }
            let Some(location) = ds.location.clone() else {
                continue;
            };
            let bytes = match LocationKind::classify(&location) {
                LocationKind::Internal => continue,
                LocationKind::Staging => {
                    let id = location.trim_start_matches(STAGING_PREFIX);
                    consumed.push(id.to_string());
                    self.ctx.staging.retrieve(id)?
                }
                LocationKind::CopyOf => self
                    .ctx
                    .datastreams
                    .retrieve(location.trim_start_matches(COPY_PREFIX))?,
                LocationKind::External => self.ctx.fetcher.fetch(&location)?.bytes,
            };
            let id = ds.managed_content_id(&pid);
            self.ctx.datastreams.put(&id, &bytes)?;
            debug!(%pid, datastream = %ds.id, version = %ds.version_id, from = %location, "materialized managed content");
            ds.size = Some(bytes.len() as u64);
            ds.location = Some(id);
        }
        Ok(consumed)
    }

    // ---- Catalog ----

    /// `count` fresh pids in `namespace`, or the configured namespace.
    pub fn get_next_pid(&self, count: usize, namespace: Option<&str>) -> RepositoryResult<Vec<Pid>> {
        let namespace = namespace.unwrap_or(&self.ctx.config.pid_namespace);
        Ok(self.ctx.pid_generator.next_pids(count, namespace)?)
    }

    pub fn find_objects(
        &self,
        result_fields: &[String],
        max_results: usize,
        query: &FieldQuery,
    ) -> RepositoryResult<FindObjectsResult> {
        Ok(self.ctx.search.find_objects(result_fields, max_results, query)?)
    }

    pub fn resume_find_objects(&self, token: &str) -> RepositoryResult<FindObjectsResult> {
        Ok(self.ctx.search.resume_find_objects(token)?)
    }

    /// The serialized document of `pid`, optionally as it stood at `as_of`.
    pub fn export(&self, pid: &Pid, as_of: Option<&Timestamp>) -> RepositoryResult<Vec<u8>> {
        self.definitive.export(pid, as_of)
    }

    /// Register and index every stored object the registry does not know
    /// about. Returns how many rows were added.
    pub fn rebuild_registry(&self) -> RepositoryResult<usize> {
        let mut added = 0;
        for id in self.ctx.objects.list()? {
            let pid = match Pid::parse(&id) {
                Ok(pid) => pid,
                Err(e) => {
                    warn!(id, error = %e, "skipping stored document with invalid pid");
                    continue;
                }
            };
            if self.ctx.registry.exists(&pid)? {
                continue;
            }
            let object = self.definitive.load(&pid)?;
            self.ctx
                .registry
                .register(RegistryEntry::for_object(&object, self.ctx.config.default_owner.clone()))?;
            self.ctx.pid_generator.retain(&pid)?;
            if let Err(e) = self.ctx.resource.add_object(&object) {
                debug!(%pid, error = %e, "resource index kept its entry");
            }
            self.replication.modify(&pid, self.definitive.as_ref())?;
            added += 1;
        }
        info!(added, "registry rebuilt");
        Ok(added)
    }

    /// Replay replication jobs left behind by failed commits.
    pub fn recover(&self) -> RepositoryResult<RecoveryReport> {
        Ok(self.replication.recover(self.definitive.as_ref())?)
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.stop_sweeper();
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("ctx", &self.ctx)
            .field("cached_readers", &self.cache.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use dor_cache::ManualClock;
    use dor_codec::{DcRecord, MetsDeserializer};
    use dor_index::{FastStore, InMemoryFastStore};
    use dor_store::{InMemoryContentFetcher, InMemoryContentStore};
    use dor_types::object::DC_DATASTREAM_ID;
    use dor_types::{
        parse_timestamp, ComponentState, Datastream, Disseminator, DsBinding, DsBindingMap,
        MdClass,
    };

    use crate::config::RepositoryConfig;
    use crate::writer::{DatastreamContent, DatastreamUpdate};

    const DC_FOO: &str = "<oai_dc:dc xmlns:oai_dc=\"http://www.openarchives.org/OAI/2.0/oai_dc/\" \
        xmlns:dc=\"http://purl.org/dc/elements/1.1/\"><dc:title>Foo</dc:title></oai_dc:dc>";

    fn pid(s: &str) -> Pid {
        Pid::parse(s).unwrap()
    }

    struct Harness {
        manager: SessionManager,
        fast: Arc<InMemoryFastStore>,
        objects: Arc<InMemoryContentStore>,
        datastreams: Arc<InMemoryContentStore>,
        staging: Arc<InMemoryContentStore>,
        fetcher: Arc<InMemoryContentFetcher>,
        clock: Arc<ManualClock>,
    }

    fn harness() -> Harness {
        let fast = Arc::new(InMemoryFastStore::new());
        let objects = Arc::new(InMemoryContentStore::new());
        let datastreams = Arc::new(InMemoryContentStore::new());
        let staging = Arc::new(InMemoryContentStore::new());
        let fetcher = Arc::new(InMemoryContentFetcher::new());
        let mut ctx = RepositoryContext::in_memory(RepositoryConfig::default())
            .with_fetcher(fetcher.clone());
        ctx.fast = fast.clone();
        ctx.objects = objects.clone();
        ctx.datastreams = datastreams.clone();
        ctx.staging = staging.clone();
        let clock = Arc::new(ManualClock::new());
        Harness {
            manager: SessionManager::with_clock(ctx, clock.clone()),
            fast,
            objects,
            datastreams,
            staging,
            fetcher,
            clock,
        }
    }

    fn document(object: &DigitalObject) -> Vec<u8> {
        MetsSerializer::new(ENCODING).unwrap().to_bytes(object).unwrap()
    }

    fn object(p: &str, label: &str) -> DigitalObject {
        let mut obj = DigitalObject::new(pid(p), ObjectKind::DataObject);
        obj.label = label.into();
        obj
    }

    fn ingest(h: &Harness, obj: &DigitalObject) -> ObjectWriter {
        let mut writer = h
            .manager
            .get_ingest_writer(&document(obj), DocumentFormat::Mets, ENCODING, false)
            .unwrap();
        h.manager.do_commit(&mut writer, "ingest", false).unwrap();
        writer
    }

    fn disseminating(p: &str, bdef: &str, bmech: &str) -> DigitalObject {
        let mut obj = object(p, "user");
        obj.add_datastream_version(Datastream::referenced(
            "IMG", "IMG.0", ControlGroup::ExternalReference, "img", "image/png", "http://example.org/a.png",
        ))
        .unwrap();
        obj.add_disseminator_version(Disseminator {
            id: "DISS1".into(),
            version_id: "DISS1.0".into(),
            bdef_pid: pid(bdef),
            bmech_pid: pid(bmech),
            binding_map_id: "S1".into(),
            label: "images".into(),
            state: None,
            created: None,
            binding_map: DsBindingMap {
                id: "S1".into(),
                mechanism_pid: pid(bmech),
                label: "images".into(),
                bindings: vec![DsBinding {
                    binding_key: "IMAGE".into(),
                    datastream_id: "IMG".into(),
                    label: "image".into(),
                    seq: 0,
                }],
            },
        })
        .unwrap();
        obj
    }

    #[test]
    fn descriptive_record_gets_pid_identifier() {
        let h = harness();
        let mut obj = object("test:1", "Foo object");
        let mut dc = Datastream::inline_xml(DC_DATASTREAM_ID, "DC.0", MdClass::Descriptive, "DC", DC_FOO.as_bytes().to_vec());
        dc.xml.as_mut().unwrap().md_type = "DC".into();
        obj.add_datastream_version(dc).unwrap();
        let writer = ingest(&h, &obj);
        h.manager.release_writer(writer);

        let reader = h.manager.get_reader(&pid("test:1"), ReaderTier::Fast).unwrap();
        let content = reader.datastream_content(DC_DATASTREAM_ID, None).unwrap();
        assert!(std::str::from_utf8(&content).unwrap().contains("Foo"));
        let record = DcRecord::parse(&content).unwrap();
        assert_eq!(record.titles(), vec!["Foo".to_string()]);
        assert!(record.identifiers().contains(&"test:1".to_string()));
    }

    #[test]
    fn ingesting_existing_pid_changes_nothing() {
        let h = harness();
        let writer = ingest(&h, &object("demo:1", "first"));
        h.manager.release_writer(writer);
        let registry_before = h.manager.context().registry.list().unwrap();
        let objects_before = h.objects.len();

        let err = h
            .manager
            .get_ingest_writer(&document(&object("demo:1", "again")), DocumentFormat::Mets, ENCODING, false)
            .unwrap_err();
        assert!(matches!(err, RepositoryError::ObjectExists(_)));
        assert_eq!(h.manager.context().registry.list().unwrap(), registry_before);
        assert_eq!(h.objects.len(), objects_before);
        assert!(h.staging.is_empty());
    }

    #[test]
    fn uncommitted_ingest_is_invisible_and_released() {
        let h = harness();
        let writer = h
            .manager
            .get_ingest_writer(&document(&object("demo:2", "x")), DocumentFormat::Mets, ENCODING, false)
            .unwrap();
        assert!(matches!(
            h.manager.get_reader(&pid("demo:2"), ReaderTier::Fast),
            Err(RepositoryError::ObjectNotFound(_))
        ));
        h.manager.release_writer(writer);
        assert!(!h.manager.context().registry.exists(&pid("demo:2")).unwrap());
    }

    #[test]
    fn second_writer_is_locked_out() {
        let h = harness();
        let writer = ingest(&h, &object("demo:3", "x"));
        assert!(matches!(
            h.manager.get_writer(&pid("demo:3")),
            Err(RepositoryError::ObjectLocked(_))
        ));
        h.manager.release_writer(writer);
        let again = h.manager.get_writer(&pid("demo:3")).unwrap();
        assert!(!again.is_new());
    }

    #[test]
    fn commit_bumps_system_version_and_replicates() {
        let h = harness();
        let writer = ingest(&h, &object("demo:4", "before"));
        h.manager.release_writer(writer);
        let registry = &h.manager.context().registry;
        assert_eq!(registry.system_version(&pid("demo:4")).unwrap(), 1);

        let mut writer = h.manager.get_writer(&pid("demo:4")).unwrap();
        writer.set_label("after", "relabel").unwrap();
        h.manager.do_commit(&mut writer, "relabel", false).unwrap();
        h.manager.release_writer(writer);

        assert_eq!(registry.system_version(&pid("demo:4")).unwrap(), 2);
        assert_eq!(registry.get(&pid("demo:4")).unwrap().unwrap().label, "after");
        let row = h.fast.object_row(&pid("demo:4")).unwrap().unwrap();
        assert_eq!(row.label, "after");
        assert!(h.manager.context().jobs.pending().unwrap().is_empty());
    }

    #[test]
    fn managed_content_is_materialized() {
        let h = harness();
        h.fetcher.insert("http://example.org/page.html", "text/html", &b"<html/>"[..]);
        h.staging.add("upload-1", b"staged bytes").unwrap();
        let writer = ingest(&h, &object("demo:5", "x"));
        h.manager.release_writer(writer);

        let mut writer = h.manager.get_writer(&pid("demo:5")).unwrap();
        writer
            .add_datastream(
                "PAGE",
                "page",
                "text/html",
                DatastreamContent::Managed { location: "http://example.org/page.html".into() },
                "add page",
            )
            .unwrap();
        writer
            .add_datastream(
                "UP",
                "upload",
                "text/plain",
                DatastreamContent::Managed { location: format!("{STAGING_PREFIX}upload-1") },
                "add upload",
            )
            .unwrap();
        h.manager.do_commit(&mut writer, "add content", false).unwrap();
        h.manager.release_writer(writer);

        let reader = h.manager.get_reader(&pid("demo:5"), ReaderTier::Definitive).unwrap();
        let page = reader.datastream("PAGE", None).unwrap();
        assert_eq!(page.location.as_deref(), Some("demo:5+PAGE+PAGE.0"));
        assert_eq!(page.size, Some(7));
        assert_eq!(&reader.datastream_content("UP", None).unwrap()[..], b"staged bytes");
        assert!(h.datastreams.exists("demo:5+UP+UP.0").unwrap());
        assert!(!h.staging.exists("upload-1").unwrap());
    }

    #[test]
    fn rebinding_a_disseminator_survives_commit() {
        let h = harness();
        let mut writer = ingest(&h, &object("demo:20", "rebind"));
        for id in ["A", "B"] {
            writer
                .add_datastream(id, id, "image/png", DatastreamContent::External { url: format!("http://example.org/{id}") }, "add")
                .unwrap();
        }
        let binding = |ds: &str| DsBinding {
            binding_key: "IMAGE".into(),
            datastream_id: ds.into(),
            label: "image".into(),
            seq: 0,
        };
        let diss = writer
            .add_disseminator(pid("demo:bdef"), pid("demo:bmech"), "images", vec![binding("A")], "bind")
            .unwrap();
        h.manager.do_commit(&mut writer, "bind", false).unwrap();
        writer
            .modify_disseminator(&diss, None, None, Some(vec![binding("B")]), "rebind")
            .unwrap();
        h.manager.do_commit(&mut writer, "rebind", false).unwrap();
        h.manager.release_writer(writer);

        let bound = |tier| {
            let reader = h.manager.get_reader(&pid("demo:20"), tier).unwrap();
            let diss = reader.disseminator_for("demo:bdef", None).unwrap().unwrap();
            diss.binding_map.bindings_for("IMAGE")[0].datastream_id.clone()
        };
        assert_eq!(bound(ReaderTier::Fast), "B");
        h.manager.cache().clear();
        assert_eq!(bound(ReaderTier::Definitive), "B");

        let exported = h.manager.export(&pid("demo:20"), None).unwrap();
        let back = MetsDeserializer::new(ENCODING).unwrap().deserialize_bytes(&exported).unwrap();
        let targets: Vec<_> = back
            .disseminator_versions(&diss)
            .iter()
            .map(|d| d.binding_map.bindings[0].datastream_id.as_str())
            .collect();
        assert_eq!(targets, ["A", "B"]);
    }

    #[test]
    fn purged_managed_content_leaves_the_store() {
        let h = harness();
        h.staging.add("upload-3", b"first").unwrap();
        h.staging.add("upload-4", b"second").unwrap();
        let mut writer = ingest(&h, &object("demo:21", "purging"));
        writer
            .add_datastream(
                "UP",
                "upload",
                "text/plain",
                DatastreamContent::Managed { location: format!("{STAGING_PREFIX}upload-3") },
                "add",
            )
            .unwrap();
        h.manager.do_commit(&mut writer, "add", false).unwrap();
        writer
            .modify_datastream(
                "UP",
                DatastreamUpdate { location: Some(format!("{STAGING_PREFIX}upload-4")), ..Default::default() },
                "replace",
            )
            .unwrap();
        h.manager.do_commit(&mut writer, "replace", false).unwrap();
        assert!(h.datastreams.exists("demo:21+UP+UP.0").unwrap());
        assert!(h.datastreams.exists("demo:21+UP+UP.1").unwrap());

        writer.purge_datastream("UP", None, "drop").unwrap();
        assert!(h.datastreams.exists("demo:21+UP+UP.0").unwrap());
        h.manager.do_commit(&mut writer, "drop", false).unwrap();
        h.manager.release_writer(writer);

        assert!(!h.datastreams.exists("demo:21+UP+UP.0").unwrap());
        assert!(!h.datastreams.exists("demo:21+UP+UP.1").unwrap());
        assert!(h.datastreams.is_empty());
    }

    #[test]
    fn relabeled_version_keeps_shared_content() {
        let h = harness();
        h.staging.add("upload-5", b"shared").unwrap();
        let mut writer = ingest(&h, &object("demo:22", "shared"));
        writer
            .add_datastream(
                "UP",
                "upload",
                "text/plain",
                DatastreamContent::Managed { location: format!("{STAGING_PREFIX}upload-5") },
                "add",
            )
            .unwrap();
        h.manager.do_commit(&mut writer, "add", false).unwrap();
        writer
            .modify_datastream("UP", DatastreamUpdate { label: Some("renamed".into()), ..Default::default() }, "relabel")
            .unwrap();
        writer.object_mut().datastreams.get_mut("UP").unwrap()[0].created =
            Some(parse_timestamp("2000-01-01T00:00:00Z").unwrap());
        let cutoff = parse_timestamp("2001-01-01T00:00:00Z").unwrap();
        assert_eq!(writer.purge_datastream("UP", Some(&cutoff), "trim").unwrap(), vec!["UP.0".to_string()]);
        h.manager.do_commit(&mut writer, "trim", false).unwrap();
        h.manager.release_writer(writer);

        let reader = h.manager.get_reader(&pid("demo:22"), ReaderTier::Definitive).unwrap();
        assert_eq!(&reader.datastream_content("UP", None).unwrap()[..], b"shared");
    }

    #[test]
    fn referenced_mechanism_cannot_be_removed() {
        let h = harness();
        let mut bmech = DigitalObject::new(pid("demo:bmech"), ObjectKind::BehaviorMechanism);
        bmech.label = "mechanism".into();
        let w = ingest(&h, &bmech);
        h.manager.release_writer(w);
        let w = ingest(&h, &disseminating("demo:10", "demo:bdef", "demo:bmech"));
        h.manager.release_writer(w);

        let mut writer = h.manager.get_writer(&pid("demo:bmech")).unwrap();
        let err = h.manager.do_commit(&mut writer, "purge", true).unwrap_err();
        assert!(matches!(err, RepositoryError::ObjectDependency { dependents: 1, .. }));
        assert!(h.objects.exists("demo:bmech").unwrap());
        assert!(h.manager.context().registry.exists(&pid("demo:bmech")).unwrap());
    }

    #[test]
    fn remove_cleans_every_store() {
        let h = harness();
        h.staging.add("upload-2", b"bytes").unwrap();
        let mut writer = ingest(&h, &object("demo:6", "doomed"));
        writer
            .add_datastream(
                "UP",
                "upload",
                "text/plain",
                DatastreamContent::Managed { location: format!("{STAGING_PREFIX}upload-2") },
                "add",
            )
            .unwrap();
        h.manager.do_commit(&mut writer, "add", false).unwrap();
        let reader = h.manager.get_reader(&pid("demo:6"), ReaderTier::Fast).unwrap();
        assert_eq!(reader.tier(), ReaderTier::Fast);
        assert_eq!(h.manager.cache().len(), 1);

        h.manager.do_commit(&mut writer, "purge", true).unwrap();
        assert!(writer.is_removed());
        h.manager.release_writer(writer);

        let ctx = h.manager.context();
        assert!(!h.objects.exists("demo:6").unwrap());
        assert!(h.datastreams.is_empty());
        assert!(!ctx.registry.exists(&pid("demo:6")).unwrap());
        assert!(!h.fast.contains(&pid("demo:6")).unwrap());
        assert!(ctx.resource.triples_for(&pid("demo:6")).unwrap().is_empty());
        let found = h
            .manager
            .find_objects(&["pid".to_string()], 10, &FieldQuery::Terms("demo:6".into()))
            .unwrap();
        assert!(found.objects.is_empty());
        assert!(h.manager.cache().is_empty());
        assert!(ctx.jobs.pending().unwrap().is_empty());
    }

    #[test]
    fn fast_reader_never_parses_the_document() {
        let h = harness();
        let w = ingest(&h, &disseminating("demo:7", "demo:bdef", "demo:bmech"));
        h.manager.release_writer(w);
        let loads = h.manager.definitive().loads();

        let reader = h.manager.get_reader(&pid("demo:7"), ReaderTier::Fast).unwrap();
        reader.profile().unwrap();
        reader.datastream("IMG", None).unwrap();
        assert!(reader.disseminator_for("demo:bdef", None).unwrap().is_some());
        assert_eq!(h.manager.definitive().loads(), loads);

        let as_of = parse_timestamp("2999-01-01T00:00:00Z").unwrap();
        reader.datastream("IMG", Some(&as_of)).unwrap();
        assert_eq!(h.manager.definitive().loads(), loads + 1);
    }

    #[test]
    fn object_missing_from_fast_store_reads_definitively() {
        let h = harness();
        let w = ingest(&h, &object("demo:8", "x"));
        h.manager.release_writer(w);
        h.fast.delete(&pid("demo:8")).unwrap();
        let loads = h.manager.definitive().loads();

        let reader = h.manager.get_reader(&pid("demo:8"), ReaderTier::Fast).unwrap();
        assert_eq!(reader.tier(), ReaderTier::Definitive);
        assert_eq!(reader.profile().unwrap().label, "x");
        reader.datastreams(None).unwrap();
        assert_eq!(h.manager.definitive().loads(), loads + 1);
        assert!(h.manager.cache().is_empty());
    }

    #[test]
    fn cached_readers_expire_after_sweep() {
        let h = harness();
        let w = ingest(&h, &object("demo:9", "x"));
        h.manager.release_writer(w);
        let first = h.manager.get_reader(&pid("demo:9"), ReaderTier::Fast).unwrap();
        let second = h.manager.get_reader(&pid("demo:9"), ReaderTier::Fast).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        h.clock.advance(Duration::from_millis(5_000));
        assert_eq!(h.manager.cache().sweep(), 1);
        let third = h.manager.get_reader(&pid("demo:9"), ReaderTier::Fast).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn export_round_trips_and_keeps_history() {
        let h = harness();
        let mut obj = object("demo:11", "history");
        obj.content_model = Some("UVA_STD_IMAGE".into());
        let desc = br#"<uvalibdesc:desc xmlns:uvalibdesc="http://dl.lib.virginia.edu/bin/dtd/descmeta/"><uvalibdesc:title>T</uvalibdesc:title></uvalibdesc:desc>"#;
        obj.add_datastream_version(Datastream::inline_xml("DESC", "DESC.0", MdClass::Descriptive, "desc", desc.to_vec()))
            .unwrap();
        let mut writer = ingest(&h, &obj);
        writer
            .modify_datastream(
                "DESC",
                DatastreamUpdate { label: Some("desc v2".into()), ..Default::default() },
                "relabel",
            )
            .unwrap();
        writer.set_datastream_state("DESC", ComponentState::Inactive, "hide").unwrap();
        h.manager.do_commit(&mut writer, "edits", false).unwrap();
        h.manager.release_writer(writer);

        let exported = h.manager.export(&pid("demo:11"), None).unwrap();
        let back = MetsDeserializer::new(ENCODING).unwrap().deserialize_bytes(&exported).unwrap();
        assert_eq!(back.pid, pid("demo:11"));
        assert_eq!(back.label, "history");
        assert_eq!(back.content_model.as_deref(), Some("UVA_STD_IMAGE"));
        let versions = back.datastream_versions("DESC");
        assert_eq!(versions.len(), 3);
        assert_eq!(versions[0].xml_content(), Some(&desc[..]));
        assert!(back.has_audit_record("AUDREC1"));

        let reader = h.manager.get_reader(&pid("demo:11"), ReaderTier::Fast).unwrap();
        assert_eq!(reader.datastream_history("DESC").unwrap().len(), 3);
    }

    #[test]
    fn rebuild_registers_stored_objects() {
        let h = harness();
        let w = ingest(&h, &object("demo:12", "x"));
        h.manager.release_writer(w);
        h.manager.context().registry.unregister(&pid("demo:12")).unwrap();

        assert_eq!(h.manager.rebuild_registry().unwrap(), 1);
        assert!(h.manager.context().registry.exists(&pid("demo:12")).unwrap());
        assert_eq!(h.manager.rebuild_registry().unwrap(), 0);
    }

    #[test]
    fn rebuild_indexes_a_reopened_store() {
        let h = harness();
        let w = ingest(&h, &object("demo:13", "kept"));
        h.manager.release_writer(w);

        let mut ctx = RepositoryContext::in_memory(RepositoryConfig::default());
        ctx.objects = h.objects.clone();
        let reopened = SessionManager::new(ctx);
        assert!(!reopened.context().fast.contains(&pid("demo:13")).unwrap());

        assert_eq!(reopened.rebuild_registry().unwrap(), 1);
        assert!(reopened.context().fast.contains(&pid("demo:13")).unwrap());
        let reader = reopened.get_reader(&pid("demo:13"), ReaderTier::Fast).unwrap();
        assert_eq!(reader.tier(), ReaderTier::Fast);
        assert_eq!(reader.profile().unwrap().label, "kept");
        assert!(reopened.get_next_pid(1, Some("demo")).unwrap()[0] != pid("demo:13"));
    }

    #[test]
    fn next_pids_use_configured_namespace() {
        let h = harness();
        let pids = h.manager.get_next_pid(2, None).unwrap();
        assert_eq!(pids.len(), 2);
        assert!(pids.iter().all(|p| p.namespace() == "changeme"));
        assert_eq!(h.manager.get_next_pid(1, Some("uva-lib")).unwrap()[0].namespace(), "uva-lib");
    }
}
