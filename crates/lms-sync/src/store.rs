//! Composition root owning the LMS resource caches, invalidation rules and mutator.

use std::future::Future;
use std::sync::Arc;

use lms_cache::{CachePolicy, Fingerprint, ResourceCache};
use lms_core::{ResourceKind, SyncConfig};
use lms_data::{FetchError, Fetcher};
use lms_domain::{
    Course, CourseId, Enrollment, EnrollmentId, EnrollmentStatus, LessonDetail, LessonId,
    OverallStats, User, UserId,
};
use tracing::debug;

use crate::bus::InvalidationBus;
use crate::error::MutationError;
use crate::list::AuthoritativeList;
use crate::mutation::{MutationContext, MutationKind};
use crate::mutator::{Mutation, OptimisticMutator};
use crate::resource::Resource;

/// Fetchers supplied by the transport layer, one per resource type.
#[derive(Clone)]
pub struct LmsFetchers {
    pub course_listing: Arc<dyn Fetcher<Fingerprint, Vec<Course>>>,
    pub course_detail: Arc<dyn Fetcher<CourseId, Course>>,
    pub enrollments: Arc<dyn Fetcher<Fingerprint, Vec<Enrollment>>>,
    pub lesson_detail: Arc<dyn Fetcher<LessonId, LessonDetail>>,
    pub stats: Arc<dyn Fetcher<Fingerprint, OverallStats>>,
    pub users: Arc<dyn Fetcher<Fingerprint, Vec<User>>>,
}

/// The synchronization layer for one client session.
///
/// Owns one [`Resource`] per resource type, the invalidation rules tying them
/// together, and the [`OptimisticMutator`] that writes through them. Build one
/// per session (or per test); stores share nothing.
#[derive(Debug, Clone)]
pub struct LmsStore {
    pub course_listing: Resource<Fingerprint, Vec<Course>>,
    pub course_detail: Resource<CourseId, Course>,
    pub enrollments: Resource<Fingerprint, Vec<Enrollment>>,
    pub lesson_detail: Resource<LessonId, LessonDetail>,
    pub stats: Resource<Fingerprint, OverallStats>,
    pub users: Resource<Fingerprint, Vec<User>>,
    mutator: OptimisticMutator,
}

fn cache_for<K, T>(config: &SyncConfig, kind: ResourceKind) -> ResourceCache<K, T>
where
    K: Eq + std::hash::Hash + Clone + std::fmt::Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    let settings = config.settings_for(kind);
    debug!(
        resource = %kind,
        ttl_secs = settings.ttl.as_secs(),
        timeout = ?settings.timeout,
        "configuring resource cache"
    );
    ResourceCache::new(kind.name(), CachePolicy::from_settings(&settings))
}

impl LmsStore {
    /// Build a store from configuration and fetchers.
    pub fn new(config: &SyncConfig, fetchers: LmsFetchers) -> Self {
        let course_listing = Resource::new(
            ResourceKind::CourseListing,
            cache_for(config, ResourceKind::CourseListing),
            fetchers.course_listing,
        );
        let course_detail = Resource::new(
            ResourceKind::CourseDetail,
            cache_for(config, ResourceKind::CourseDetail),
            fetchers.course_detail,
        );
        // A user without enrollments may get a 404 from the listing endpoint.
        let enrollments = Resource::new(
            ResourceKind::Enrollments,
            cache_for::<Fingerprint, Vec<Enrollment>>(config, ResourceKind::Enrollments)
                .with_missing_as_default(),
            fetchers.enrollments,
        );
        let lesson_detail = Resource::new(
            ResourceKind::LessonDetail,
            cache_for(config, ResourceKind::LessonDetail),
            fetchers.lesson_detail,
        );
        let stats = Resource::new(
            ResourceKind::OverallStats,
            cache_for(config, ResourceKind::OverallStats),
            fetchers.stats,
        );
        let users = Resource::new(
            ResourceKind::Users,
            cache_for(config, ResourceKind::Users),
            fetchers.users,
        );

        let bus = Self::rules(
            course_listing.cache(),
            course_detail.cache(),
            enrollments.cache(),
            lesson_detail.cache(),
            stats.cache(),
            users.cache(),
        );

        Self {
            course_listing,
            course_detail,
            enrollments,
            lesson_detail,
            stats,
            users,
            mutator: OptimisticMutator::new(Arc::new(bus)),
        }
    }

    fn rules(
        listing: &ResourceCache<Fingerprint, Vec<Course>>,
        detail: &ResourceCache<CourseId, Course>,
        enrollments: &ResourceCache<Fingerprint, Vec<Enrollment>>,
        lessons: &ResourceCache<LessonId, LessonDetail>,
        stats: &ResourceCache<Fingerprint, OverallStats>,
        users: &ResourceCache<Fingerprint, Vec<User>>,
    ) -> InvalidationBus {
        let by_course = |ctx: &MutationContext| ctx.course_id;
        let by_lesson = |ctx: &MutationContext| ctx.lesson_id;

        InvalidationBus::builder()
            .on(MutationKind::Enroll, |rule| {
                rule.clear(enrollments)
                    .clear(listing)
                    .clear_key(detail, by_course)
                    .mark_stale(stats)
            })
            .on(MutationKind::Unenroll, |rule| {
                rule.clear(enrollments)
                    .clear(listing)
                    .clear_key(detail, by_course)
                    .mark_stale(stats)
            })
            .on(MutationKind::UpdateEnrollmentStatus, |rule| {
                rule.clear(enrollments).mark_stale(stats)
            })
            .on(MutationKind::CreateCourse, |rule| {
                rule.clear(listing).mark_stale(stats)
            })
            .on(MutationKind::UpdateCourse, |rule| {
                rule.clear(listing).clear_key(detail, by_course)
            })
            .on(MutationKind::DeleteCourse, |rule| {
                rule.clear(listing)
                    .clear_key(detail, by_course)
                    .clear(enrollments)
                    .mark_stale(stats)
            })
            .on(MutationKind::UpdateUser, |rule| rule.clear(users))
            .on(MutationKind::UpdateUserStatus, |rule| rule.clear(users))
            .on(MutationKind::DeleteUser, |rule| rule.clear(users).mark_stale(stats))
            .on(MutationKind::CompleteLesson, |rule| {
                rule.clear_key(lessons, by_lesson)
                    .clear(enrollments)
                    .mark_stale(stats)
            })
            .build()
    }

    /// The optimistic mutator (and through it the invalidation bus).
    pub fn mutator(&self) -> &OptimisticMutator {
        &self.mutator
    }

    /// The invalidation rules.
    pub fn bus(&self) -> &InvalidationBus {
        self.mutator.bus()
    }

    /// Courses matching `filter` (`Fingerprint::all()` or a category).
    pub async fn courses(&self, filter: Fingerprint) -> Result<Vec<Course>, FetchError> {
        self.course_listing.get(filter).await
    }

    /// One course.
    pub async fn course(&self, id: CourseId) -> Result<Course, FetchError> {
        self.course_detail.get(id).await
    }

    /// Enrollments matching `filter` (e.g. all, or one user's).
    pub async fn enrollments(&self, filter: Fingerprint) -> Result<Vec<Enrollment>, FetchError> {
        self.enrollments.get(filter).await
    }

    /// One lesson.
    pub async fn lesson(&self, id: LessonId) -> Result<LessonDetail, FetchError> {
        self.lesson_detail.get(id).await
    }

    /// Dashboard totals.
    pub async fn overall_stats(&self) -> Result<OverallStats, FetchError> {
        self.stats.get(Fingerprint::all()).await
    }

    /// Users matching `filter`.
    pub async fn users(&self, filter: Fingerprint) -> Result<Vec<User>, FetchError> {
        self.users.get(filter).await
    }

    /// Enroll `user` in `course`, showing a placeholder enrollment until the
    /// server confirms it.
    pub async fn enroll<F, Fut>(
        &self,
        list: &AuthoritativeList<Enrollment>,
        user: UserId,
        course: CourseId,
        remote: F,
    ) -> Result<Enrollment, MutationError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Enrollment, FetchError>>,
    {
        let mutation = Mutation::create(MutationKind::Enroll, Enrollment::pending(user, course))
            .with_context(MutationContext::new().user(user).course(course));
        self.mutator.mutate(list, mutation, remote).await
    }

    /// Remove an enrollment.
    pub async fn unenroll<F, Fut>(
        &self,
        list: &AuthoritativeList<Enrollment>,
        id: EnrollmentId,
        remote: F,
    ) -> Result<(), MutationError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), FetchError>>,
    {
        let mut context = MutationContext::new().enrollment(id);
        if let Some(enrollment) = list.find(id) {
            context = context.course(enrollment.course_id).user(enrollment.user_id);
        }
        let mutation = Mutation::<Enrollment, ()>::remove(MutationKind::Unenroll, id).with_context(context);
        self.mutator.mutate(list, mutation, remote).await
    }

    /// Change an enrollment's status.
    pub async fn set_enrollment_status<F, Fut>(
        &self,
        list: &AuthoritativeList<Enrollment>,
        id: EnrollmentId,
        status: EnrollmentStatus,
        remote: F,
    ) -> Result<Enrollment, MutationError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Enrollment, FetchError>>,
    {
        let mutation = Mutation::<Enrollment, Enrollment>::patch(MutationKind::UpdateEnrollmentStatus, id, move |e: &mut Enrollment| {
            e.status = status
        })
        .with_context(MutationContext::new().enrollment(id));
        self.mutator.mutate(list, mutation, remote).await
    }

    /// Create a course from a draft carrying a temporary id.
    pub async fn create_course<F, Fut>(
        &self,
        list: &AuthoritativeList<Course>,
        draft: Course,
        remote: F,
    ) -> Result<Course, MutationError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Course, FetchError>>,
    {
        let mut context = MutationContext::new();
        if let Some(category) = draft.category_id {
            context = context.category(category);
        }
        let mutation = Mutation::create(MutationKind::CreateCourse, draft).with_context(context);
        self.mutator.mutate(list, mutation, remote).await
    }

    /// Save changes to a course.
    pub async fn update_course<F, Fut>(
        &self,
        list: &AuthoritativeList<Course>,
        course: Course,
        remote: F,
    ) -> Result<Course, MutationError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Course, FetchError>>,
    {
        let context = MutationContext::new().course(course.id);
        let mutation = Mutation::replace(MutationKind::UpdateCourse, course).with_context(context);
        self.mutator.mutate(list, mutation, remote).await
    }

    /// Delete a course.
    pub async fn delete_course<F, Fut>(
        &self,
        list: &AuthoritativeList<Course>,
        id: CourseId,
        remote: F,
    ) -> Result<(), MutationError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), FetchError>>,
    {
        let mutation =
            Mutation::<Course, ()>::remove(MutationKind::DeleteCourse, id).with_context(MutationContext::new().course(id));
        self.mutator.mutate(list, mutation, remote).await
    }

    /// Save changes to a user.
    pub async fn update_user<F, Fut>(
        &self,
        list: &AuthoritativeList<User>,
        user: User,
        remote: F,
    ) -> Result<User, MutationError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<User, FetchError>>,
    {
        let context = MutationContext::new().user(user.id);
        let mutation = Mutation::replace(MutationKind::UpdateUser, user).with_context(context);
        self.mutator.mutate(list, mutation, remote).await
    }

    /// Activate or deactivate a user.
    pub async fn toggle_user_active<F, Fut>(
        &self,
        list: &AuthoritativeList<User>,
        id: UserId,
        remote: F,
    ) -> Result<User, MutationError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<User, FetchError>>,
    {
        let mutation = Mutation::<User, User>::toggle(MutationKind::UpdateUserStatus, id, |user: &mut User| {
            user.active = !user.active
        })
        .with_context(MutationContext::new().user(id));
        self.mutator.mutate(list, mutation, remote).await
    }

    /// Delete a user.
    pub async fn delete_user<F, Fut>(
        &self,
        list: &AuthoritativeList<User>,
        id: UserId,
        remote: F,
    ) -> Result<(), MutationError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), FetchError>>,
    {
        let mutation =
            Mutation::<User, ()>::remove(MutationKind::DeleteUser, id).with_context(MutationContext::new().user(id));
        self.mutator.mutate(list, mutation, remote).await
    }

    /// Mark a lesson complete, updating the cached lesson immediately.
    pub async fn complete_lesson<R, F, Fut>(&self, id: LessonId, remote: F) -> Result<R, MutationError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<R, FetchError>>,
    {
        let cache = self.lesson_detail.cache();
        let mut context = MutationContext::new().lesson(id);
        if let Some(lesson) = cache.peek(&id) {
            context = context.course(lesson.course_id);
        }
        self.mutator
            .mutate_cached(
                cache,
                id,
                MutationKind::CompleteLesson,
                context,
                |lesson| lesson.completed = true,
                remote,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lms_data::fetcher_fn;

    fn empty_fetchers() -> LmsFetchers {
        LmsFetchers {
            course_listing: Arc::new(fetcher_fn(|_: Fingerprint| async {
                Ok::<_, FetchError>(Vec::new())
            })),
            course_detail: Arc::new(fetcher_fn(|id: CourseId| async move {
                Err::<Course, _>(FetchError::not_found(format!("course {}", id)))
            })),
            enrollments: Arc::new(fetcher_fn(|_: Fingerprint| async {
                Err::<Vec<Enrollment>, _>(FetchError::not_found("no enrollments"))
            })),
            lesson_detail: Arc::new(fetcher_fn(|id: LessonId| async move {
                Err::<LessonDetail, _>(FetchError::not_found(format!("lesson {}", id)))
            })),
            stats: Arc::new(fetcher_fn(|_: Fingerprint| async {
                Ok::<_, FetchError>(OverallStats::default())
            })),
            users: Arc::new(fetcher_fn(|_: Fingerprint| async {
                Ok::<_, FetchError>(Vec::new())
            })),
        }
    }

    #[test]
    fn test_every_mutation_kind_has_a_rule() {
        let store = LmsStore::new(&SyncConfig::default(), empty_fetchers());
        for kind in MutationKind::ALL {
            let rule = store.bus().rule(kind);
            assert!(rule.is_some(), "no rule for {}", kind);
        }
        let enroll = store.bus().rule(MutationKind::Enroll).unwrap().affected();
        assert_eq!(
            enroll,
            vec!["enrollments", "course_listing", "course_detail", "overall_stats"]
        );
    }

    #[test]
    fn test_ttls_follow_config() {
        let config = SyncConfig::default().with_ttl(ResourceKind::Users, std::time::Duration::from_secs(30));
        let store = LmsStore::new(&config, empty_fetchers());
        assert_eq!(store.users.cache().ttl().as_secs(), 30);
        assert_eq!(
            store.course_detail.cache().ttl(),
            ResourceKind::CourseDetail.default_ttl()
        );
    }

    #[tokio::test]
    async fn test_missing_enrollments_are_empty() {
        let store = LmsStore::new(&SyncConfig::default(), empty_fetchers());
        assert!(store.enrollments(Fingerprint::all()).await.unwrap().is_empty());
        assert!(store.course(CourseId::new(4)).await.unwrap_err().is_not_found());
    }
}
