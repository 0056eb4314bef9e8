//! Shared mapped classes: a blog domain, a polymorphic content
//! hierarchy, and a composite-keyed subscription.
//!
//! `User` keeps a caller-assigned string identifier; `Post`, `Comment`
//! and `Deploy` get theirs from the remote on create. `Post.comments`
//! is extra-lazy with orphan removal, `User.posts` is plainly lazy, and
//! `Build` is keyed by a timestamp.

use crate::remote::FakeRemote;
use remorm_core::{
    AccessorTable, AssocValue, CacheBackend, Entity, EntityManager, EntityRegistry, EntityRef,
    KeyStrategy, LazyCollection,
};
use remorm_meta::{
    AssociationMapping, CacheConfig, ClassDescription, FetchMode, FieldMapping, IdGeneration,
    MappingDriver, MetadataFactory, StaticDriver,
};
use remorm_rpc::{ClientRegistry, SortOrder};
use remorm_wire::Value;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

/// Blog author with a natural string identifier.
#[derive(Debug, Default, Clone)]
pub struct User {
    /// Caller-assigned identifier.
    pub id: Option<String>,
    /// Display name.
    pub name: String,
    /// Optional contact address.
    pub email: Option<String>,
    /// Inverse side of `Post.author`.
    pub posts: Option<LazyCollection>,
}

impl Entity for User {
    const CLASS: &'static str = "User";
}

/// Blog post with a remote-generated integer identifier.
#[derive(Debug, Default, Clone)]
pub struct Post {
    /// Remote-generated identifier.
    pub id: Option<i64>,
    /// Title.
    pub title: String,
    /// Like counter.
    pub likes: i64,
    /// Owning side, nullable.
    pub author: Option<EntityRef>,
    /// Extra-lazy inverse of `Comment.post`, with orphan removal.
    pub comments: Option<LazyCollection>,
    /// Pinned comment; with `Comment.post` this closes a reference
    /// cycle between the two classes.
    pub featured: Option<EntityRef>,
}

impl Entity for Post {
    const CLASS: &'static str = "Post";
}

/// Comment under a post.
#[derive(Debug, Default, Clone)]
pub struct Comment {
    /// Remote-generated identifier.
    pub id: Option<i64>,
    /// Comment body.
    pub body: String,
    /// Owning side back to the post.
    pub post: Option<EntityRef>,
}

impl Entity for Comment {
    const CLASS: &'static str = "Comment";
}

/// Concrete subclass of the abstract `Content` root.
#[derive(Debug, Default, Clone)]
pub struct Article {
    /// Identifier, shared across the hierarchy.
    pub id: Option<i64>,
    /// Title, declared on the root.
    pub title: String,
    /// Article text.
    pub body: String,
}

impl Entity for Article {
    const CLASS: &'static str = "Article";
}

/// Concrete subclass of the abstract `Content` root.
#[derive(Debug, Default, Clone)]
pub struct Video {
    /// Identifier, shared across the hierarchy.
    pub id: Option<i64>,
    /// Title, declared on the root.
    pub title: String,
    /// Runtime in seconds.
    pub duration: i64,
}

impl Entity for Video {
    const CLASS: &'static str = "Video";
}

/// Composite-keyed link between a user and a plan.
#[derive(Debug, Default, Clone)]
pub struct Subscription {
    /// First identifier member, association-valued.
    pub user: Option<EntityRef>,
    /// Second identifier member.
    pub plan: String,
    /// Whether the subscription is live.
    pub active: bool,
}

impl Entity for Subscription {
    const CLASS: &'static str = "Subscription";
}

/// Nightly build keyed by its start instant.
#[derive(Debug, Default, Clone)]
pub struct Build {
    /// Identifier; stored as unix seconds on the wire.
    pub at: Option<OffsetDateTime>,
    /// Outcome label.
    pub status: String,
}

impl Entity for Build {
    const CLASS: &'static str = "Build";
}

/// Rollout of one build to an environment.
#[derive(Debug, Default, Clone)]
pub struct Deploy {
    /// Remote-generated identifier.
    pub id: Option<i64>,
    /// Target environment name.
    pub env: String,
    /// Owning side back to the build.
    pub build: Option<EntityRef>,
}

impl Entity for Deploy {
    const CLASS: &'static str = "Deploy";
}

fn text(value: &Value) -> String {
    value.as_text().unwrap_or_default().to_owned()
}

fn opt_text(value: &Value) -> Option<String> {
    value.as_text().map(str::to_owned)
}

fn int(value: &Value) -> i64 {
    value.as_int().unwrap_or_default()
}

fn opt_int(value: &Value) -> Option<i64> {
    value.as_int()
}

fn single(value: AssocValue) -> Option<EntityRef> {
    match value {
        AssocValue::Ref(target) => Some(target),
        _ => None,
    }
}

fn collection(value: AssocValue) -> Option<LazyCollection> {
    match value {
        AssocValue::Collection(collection) => Some(collection),
        _ => None,
    }
}

fn as_single(target: &Option<EntityRef>) -> AssocValue {
    match target {
        Some(target) => AssocValue::Ref(target.clone()),
        None => AssocValue::Null,
    }
}

fn as_collection(collection: &Option<LazyCollection>) -> AssocValue {
    match collection {
        Some(collection) => AssocValue::Collection(collection.clone()),
        None => AssocValue::Null,
    }
}

fn user_accessors() -> AccessorTable {
    AccessorTable::builder::<User>()
        .field(
            "id",
            |u| Value::from(u.id.clone()),
            |u, v| {
                u.id = opt_text(&v);
                Ok(())
            },
        )
        .field(
            "name",
            |u| Value::from(u.name.as_str()),
            |u, v| {
                u.name = text(&v);
                Ok(())
            },
        )
        .field(
            "email",
            |u| Value::from(u.email.clone()),
            |u, v| {
                u.email = opt_text(&v);
                Ok(())
            },
        )
        .association(
            "posts",
            |u| as_collection(&u.posts),
            |u, v| {
                u.posts = collection(v);
                Ok(())
            },
        )
        .build()
}

fn post_accessors() -> AccessorTable {
    AccessorTable::builder::<Post>()
        .field(
            "id",
            |p| Value::from(p.id),
            |p, v| {
                p.id = opt_int(&v);
                Ok(())
            },
        )
        .field(
            "title",
            |p| Value::from(p.title.as_str()),
            |p, v| {
                p.title = text(&v);
                Ok(())
            },
        )
        .field(
            "likes",
            |p| Value::Int(p.likes),
            |p, v| {
                p.likes = int(&v);
                Ok(())
            },
        )
        .association(
            "author",
            |p| as_single(&p.author),
            |p, v| {
                p.author = single(v);
                Ok(())
            },
        )
        .association(
            "comments",
            |p| as_collection(&p.comments),
            |p, v| {
                p.comments = collection(v);
                Ok(())
            },
        )
        .association(
            "featured",
            |p| as_single(&p.featured),
            |p, v| {
                p.featured = single(v);
                Ok(())
            },
        )
        .build()
}

fn comment_accessors() -> AccessorTable {
    AccessorTable::builder::<Comment>()
        .field(
            "id",
            |c| Value::from(c.id),
            |c, v| {
                c.id = opt_int(&v);
                Ok(())
            },
        )
        .field(
            "body",
            |c| Value::from(c.body.as_str()),
            |c, v| {
                c.body = text(&v);
                Ok(())
            },
        )
        .association(
            "post",
            |c| as_single(&c.post),
            |c, v| {
                c.post = single(v);
                Ok(())
            },
        )
        .build()
}

fn article_accessors() -> AccessorTable {
    AccessorTable::builder::<Article>()
        .field(
            "id",
            |a| Value::from(a.id),
            |a, v| {
                a.id = opt_int(&v);
                Ok(())
            },
        )
        .field(
            "title",
            |a| Value::from(a.title.as_str()),
            |a, v| {
                a.title = text(&v);
                Ok(())
            },
        )
        .field(
            "body",
            |a| Value::from(a.body.as_str()),
            |a, v| {
                a.body = text(&v);
                Ok(())
            },
        )
        .build()
}

fn video_accessors() -> AccessorTable {
    AccessorTable::builder::<Video>()
        .field(
            "id",
            |v| Value::from(v.id),
            |v, w| {
                v.id = opt_int(&w);
                Ok(())
            },
        )
        .field(
            "title",
            |v| Value::from(v.title.as_str()),
            |v, w| {
                v.title = text(&w);
                Ok(())
            },
        )
        .field(
            "duration",
            |v| Value::Int(v.duration),
            |v, w| {
                v.duration = int(&w);
                Ok(())
            },
        )
        .build()
}

fn subscription_accessors() -> AccessorTable {
    AccessorTable::builder::<Subscription>()
        .field(
            "plan",
            |s| Value::from(s.plan.as_str()),
            |s, v| {
                s.plan = text(&v);
                Ok(())
            },
        )
        .field(
            "active",
            |s| Value::Bool(s.active),
            |s, v| {
                s.active = v.as_bool().unwrap_or_default();
                Ok(())
            },
        )
        .association(
            "user",
            |s| as_single(&s.user),
            |s, v| {
                s.user = single(v);
                Ok(())
            },
        )
        .build()
}

fn build_accessors() -> AccessorTable {
    AccessorTable::builder::<Build>()
        .field(
            "at",
            |b| b.at.map(Value::DateTime).unwrap_or(Value::Null),
            |b, v| {
                b.at = match v {
                    Value::DateTime(at) => Some(at),
                    _ => None,
                };
                Ok(())
            },
        )
        .field(
            "status",
            |b| Value::from(b.status.as_str()),
            |b, v| {
                b.status = text(&v);
                Ok(())
            },
        )
        .build()
}

fn deploy_accessors() -> AccessorTable {
    AccessorTable::builder::<Deploy>()
        .field(
            "id",
            |d| Value::from(d.id),
            |d, v| {
                d.id = opt_int(&v);
                Ok(())
            },
        )
        .field(
            "env",
            |d| Value::from(d.env.as_str()),
            |d, v| {
                d.env = text(&v);
                Ok(())
            },
        )
        .association(
            "build",
            |d| as_single(&d.build),
            |d, v| {
                d.build = single(v);
                Ok(())
            },
        )
        .build()
}

/// Mapping descriptions for every fixture class.
#[must_use]
pub fn driver() -> StaticDriver {
    StaticDriver::new()
        .with(
            ClassDescription::entity("User")
                .field(FieldMapping::new("id", "id", "string"))
                .field(FieldMapping::new("name", "name", "string"))
                .field(FieldMapping::new("email", "email", "string").nullable(true))
                .association(
                    AssociationMapping::one_to_many("posts", "Post", "author")
                        .order_by("id", SortOrder::Asc),
                )
                .id_field("id")
                .cache(CacheConfig::enabled(Duration::from_secs(300))),
        )
        .with(
            ClassDescription::entity("Post")
                .field(FieldMapping::new("id", "id", "int"))
                .field(FieldMapping::new("title", "title", "string"))
                .field(FieldMapping::new("likes", "likes", "int"))
                .association(
                    AssociationMapping::many_to_one("author", "authorId", "User")
                        .nullable(true)
                        .cascade_persist(),
                )
                .association(
                    AssociationMapping::one_to_many("comments", "Comment", "post")
                        .fetch(FetchMode::ExtraLazy)
                        .orphan_removal()
                        .order_by("id", SortOrder::Asc),
                )
                .association(
                    AssociationMapping::many_to_one("featured", "featuredId", "Comment")
                        .nullable(true),
                )
                .id_field("id")
                .id_generation(IdGeneration::Remote),
        )
        .with(
            ClassDescription::entity("Comment")
                .field(FieldMapping::new("id", "id", "int"))
                .field(FieldMapping::new("body", "body", "string"))
                .association(
                    AssociationMapping::many_to_one("post", "postId", "Post").nullable(true),
                )
                .id_field("id")
                .id_generation(IdGeneration::Remote),
        )
        .with(
            ClassDescription::entity("Content")
                .abstract_class()
                .discriminator_field("kind")
                .discriminator_entry("article", "Article")
                .discriminator_entry("video", "Video")
                .field(FieldMapping::new("id", "id", "int"))
                .field(FieldMapping::new("title", "title", "string"))
                .id_field("id"),
        )
        .with(
            ClassDescription::entity("Article")
                .parent("Content")
                .field(FieldMapping::new("body", "body", "string")),
        )
        .with(
            ClassDescription::entity("Video")
                .parent("Content")
                .field(FieldMapping::new("duration", "duration", "int")),
        )
        .with(
            ClassDescription::entity("Subscription")
                .field(FieldMapping::new("plan", "plan", "string"))
                .field(FieldMapping::new("active", "active", "bool"))
                .association(AssociationMapping::many_to_one("user", "userId", "User"))
                .id_field("user")
                .id_field("plan"),
        )
        .with(
            ClassDescription::entity("Build")
                .field(FieldMapping::new("at", "at", "timestamp"))
                .field(FieldMapping::new("status", "status", "string"))
                .id_field("at"),
        )
        .with(
            ClassDescription::entity("Deploy")
                .field(FieldMapping::new("id", "id", "int"))
                .field(FieldMapping::new("env", "env", "string"))
                .association(
                    AssociationMapping::many_to_one("build", "buildAt", "Build").nullable(true),
                )
                .id_field("id")
                .id_generation(IdGeneration::Remote),
        )
}

/// Accessor tables for every fixture class.
#[must_use]
pub fn registry() -> EntityRegistry {
    EntityRegistry::new()
        .with(user_accessors())
        .with(post_accessors())
        .with(comment_accessors())
        .with(article_accessors())
        .with(video_accessors())
        .with(subscription_accessors())
        .with(build_accessors())
        .with(deploy_accessors())
}

/// A fake remote with identifier generation wired for the classes that
/// use the remote strategy.
#[must_use]
pub fn remote() -> Arc<FakeRemote> {
    let remote = FakeRemote::new();
    remote.generate_ids("post", "id");
    remote.generate_ids("comment", "id");
    remote.generate_ids("deploy", "id");
    Arc::new(remote)
}

/// An engine over the fixture mappings and the given remote.
#[must_use]
pub fn manager(remote: Arc<FakeRemote>) -> EntityManager {
    builder(remote)
        .build()
        .expect("fixture engine assembles")
}

/// An engine with a shared record cache.
#[must_use]
pub fn manager_with_cache(
    remote: Arc<FakeRemote>,
    cache: Arc<dyn CacheBackend>,
    strategy: KeyStrategy,
) -> EntityManager {
    builder(remote)
        .cache(cache)
        .key_strategy(strategy)
        .build()
        .expect("fixture engine assembles")
}

fn builder(remote: Arc<FakeRemote>) -> remorm_core::EntityManagerBuilder {
    let mut clients = ClientRegistry::new();
    clients.set_default(remote);
    EntityManager::builder()
        .metadata(Arc::new(MetadataFactory::new(
            Box::new(driver()) as Box<dyn MappingDriver>
        )))
        .accessors(Arc::new(registry()))
        .clients(Arc::new(clients))
}
