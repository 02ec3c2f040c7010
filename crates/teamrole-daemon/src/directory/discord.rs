//! Discord REST directory backend
//!
//! Talks to the Discord HTTP API with a bot token. There is no gateway
//! connection, so the member cache is rebuilt by a full enumeration when the
//! guild is first resolved and again whenever it is resolved after the refresh
//! interval has passed. Searches and our own successful mutations patch it in
//! between; members the API reports as unknown are evicted.

use super::{Directory, Guild};
use crate::error::{DirectoryError, DirectoryResult};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use teamrole_types::{GuildId, Member, MemberId, Role, RoleColor, RoleId};
use tokio::time::Instant;

/// Largest page the member list endpoint accepts
const MEMBER_PAGE_SIZE: usize = 1000;

/// Times a rate-limited request is retried before the error is returned
const RATE_LIMIT_RETRIES: u32 = 3;

/// Default age after which the member cache is re-enumerated
pub const DEFAULT_MEMBER_REFRESH: Duration = Duration::from_secs(60);

/// Authenticated HTTP transport shared by the directory and its guilds
struct DiscordHttp {
    client: Client,
    base_url: String,
    authorization: String,
    closed: AtomicBool,
}

impl DiscordHttp {
    fn request(&self, method: Method, path: &str) -> DirectoryResult<RequestBuilder> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DirectoryError::Unavailable(
                "connection shut down".to_string(),
            ));
        }
        let url = format!("{}{}", self.base_url, path);
        Ok(self
            .client
            .request(method, &url)
            .header(header::AUTHORIZATION, &self.authorization))
    }

    /// Send a request, sleeping out and retrying 429 responses a bounded
    /// number of times
    async fn send<F>(&self, method: Method, path: &str, build: F) -> DirectoryResult<Response>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            let response = build(self.request(method.clone(), path)?).send().await?;
            if response.status() != StatusCode::TOO_MANY_REQUESTS || attempt >= RATE_LIMIT_RETRIES {
                return Ok(response);
            }

            attempt += 1;
            let retry_after = retry_after(&response.text().await.unwrap_or_default());
            tracing::debug!(
                path,
                attempt,
                retry_after_ms = retry_after.as_millis() as u64,
                "Rate limited, retrying"
            );
            tokio::time::sleep(retry_after).await;
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> DirectoryResult<T> {
        let response = self.send(Method::GET, path, |r| r).await?;
        handle_response(response).await
    }

    async fn get_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> DirectoryResult<T> {
        let response = self.send(Method::GET, path, |r| r.query(query)).await?;
        handle_response(response).await
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> DirectoryResult<T> {
        let response = self.send(Method::POST, path, |r| r.json(body)).await?;
        handle_response(response).await
    }

    async fn patch<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> DirectoryResult<T> {
        let response = self.send(Method::PATCH, path, |r| r.json(body)).await?;
        handle_response(response).await
    }

    async fn put_empty(&self, path: &str) -> DirectoryResult<()> {
        let response = self.send(Method::PUT, path, |r| r).await?;
        handle_empty(response).await
    }

    async fn delete_empty(&self, path: &str) -> DirectoryResult<()> {
        let response = self.send(Method::DELETE, path, |r| r).await?;
        handle_empty(response).await
    }
}

async fn handle_response<T: DeserializeOwned>(response: Response) -> DirectoryResult<T> {
    if response.status().is_success() {
        Ok(response.json().await?)
    } else {
        Err(error_from_response(response).await)
    }
}

async fn handle_empty(response: Response) -> DirectoryResult<()> {
    if response.status().is_success() {
        Ok(())
    } else {
        Err(error_from_response(response).await)
    }
}

async fn error_from_response(response: Response) -> DirectoryError {
    let status = response.status();
    let message = response.text().await.unwrap_or_default();

    match status {
        StatusCode::NOT_FOUND => DirectoryError::NotFound(message),
        StatusCode::TOO_MANY_REQUESTS => DirectoryError::RateLimited {
            retry_after: retry_after(&message),
        },
        _ => DirectoryError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    retry_after: f64,
}

/// Back-off requested by a 429 body, one second when unreadable
fn retry_after(body: &str) -> Duration {
    serde_json::from_str::<RateLimitBody>(body)
        .ok()
        .filter(|body| body.retry_after.is_finite())
        .map(|body| Duration::from_secs_f64(body.retry_after.clamp(0.0, 60.0)))
        .unwrap_or(Duration::from_secs(1))
}

#[derive(Debug, Deserialize)]
struct CurrentUser {
    id: String,
    username: String,
}

#[derive(Debug, Deserialize)]
struct GuildPayload {
    id: GuildId,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    id: MemberId,
    username: String,
}

#[derive(Debug, Deserialize)]
struct GuildMemberPayload {
    user: UserPayload,
    #[serde(default)]
    nick: Option<String>,
    #[serde(default)]
    roles: BTreeSet<RoleId>,
}

impl From<GuildMemberPayload> for Member {
    fn from(payload: GuildMemberPayload) -> Self {
        Member {
            id: payload.user.id,
            username: payload.user.username,
            nickname: payload.nick,
            roles: payload.roles,
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateRoleRequest<'a> {
    name: &'a str,
    color: RoleColor,
}

#[derive(Debug, Serialize)]
struct ModifyMemberRolesRequest<'a> {
    roles: &'a BTreeSet<RoleId>,
}

/// Directory backed by the Discord REST API
pub struct DiscordDirectory {
    http: Arc<DiscordHttp>,
    guilds: RwLock<HashMap<GuildId, Arc<DiscordGuild>>>,
    member_refresh: Duration,
}

impl DiscordDirectory {
    /// Build the HTTP client and verify the bot token.
    pub async fn connect(api_base: &str, token: &str, timeout: Duration) -> DirectoryResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        let http = Arc::new(DiscordHttp {
            client,
            base_url: api_base.trim_end_matches('/').to_string(),
            authorization: format!("Bot {}", token.trim()),
            closed: AtomicBool::new(false),
        });

        let me: CurrentUser = http.get("/users/@me").await?;
        tracing::info!(bot_id = %me.id, bot = %me.username, "Connected to Discord");

        Ok(Self {
            http,
            guilds: RwLock::new(HashMap::new()),
            member_refresh: DEFAULT_MEMBER_REFRESH,
        })
    }

    /// Re-enumerate a guild's members when it is resolved after `interval`
    pub fn with_member_refresh(mut self, interval: Duration) -> Self {
        self.member_refresh = interval;
        self
    }
}

#[async_trait]
impl Directory for DiscordDirectory {
    async fn guild(&self, id: &GuildId) -> Option<Arc<dyn Guild>> {
        let cached = self.guilds.read().get(id).cloned();
        if let Some(guild) = cached {
            guild.refresh_if_stale().await;
            return Some(guild as Arc<dyn Guild>);
        }

        let payload: GuildPayload = match self.http.get(&format!("/guilds/{}", id.as_str())).await
        {
            Ok(payload) => payload,
            Err(e) => {
                tracing::debug!(guild_id = %id, error = %e, "Guild not resolvable");
                return None;
            }
        };
        tracing::info!(guild_id = %payload.id, guild = %payload.name, "Resolved guild");

        let guild = Arc::new(DiscordGuild::new(
            payload.id,
            self.http.clone(),
            self.member_refresh,
        ));
        guild.refresh_if_stale().await;

        let guild: Arc<dyn Guild> = self.guilds.write().entry(id.clone()).or_insert(guild).clone();
        Some(guild)
    }

    fn shutdown_now(&self) {
        self.http.closed.store(true, Ordering::SeqCst);
        tracing::info!("Discord connection closed");
    }
}

/// One guild reached through the Discord REST API
pub struct DiscordGuild {
    id: GuildId,
    http: Arc<DiscordHttp>,
    members: RwLock<HashMap<MemberId, Member>>,
    /// When the cache was last rebuilt from a full enumeration
    refreshed_at: Mutex<Option<Instant>>,
    refresh_interval: Duration,
    page_size: usize,
}

impl DiscordGuild {
    fn new(id: GuildId, http: Arc<DiscordHttp>, refresh_interval: Duration) -> Self {
        Self {
            id,
            http,
            members: RwLock::new(HashMap::new()),
            refreshed_at: Mutex::new(None),
            refresh_interval,
            page_size: MEMBER_PAGE_SIZE,
        }
    }

    /// Rebuild the member cache if it was never built or has aged out.
    /// A failed enumeration keeps the old cache and is retried next time.
    async fn refresh_if_stale(&self) {
        let refreshed_at = *self.refreshed_at.lock();
        let stale = refreshed_at.map_or(true, |at| at.elapsed() >= self.refresh_interval);
        if !stale {
            return;
        }

        match self.load_members().await {
            Ok(members) => {
                tracing::debug!(guild_id = %self.id, members = members.len(), "Refreshed member cache");
            }
            Err(e) => {
                tracing::warn!(guild_id = %self.id, error = %e, "Failed to refresh member cache");
            }
        }
    }

    fn cache_members(&self, members: &[Member]) {
        let mut cache = self.members.write();
        for member in members {
            cache.insert(member.id.clone(), member.clone());
        }
    }

    fn update_cached<F: FnOnce(&mut Member)>(&self, id: &MemberId, update: F) {
        if let Some(member) = self.members.write().get_mut(id) {
            update(member);
        }
    }

    /// Drop a member the API no longer knows about
    fn evict_if_missing<T>(&self, id: &MemberId, result: DirectoryResult<T>) -> DirectoryResult<T> {
        if let Err(DirectoryError::NotFound(_)) = &result {
            if self.members.write().remove(id).is_some() {
                tracing::debug!(member = %id, "Evicted unknown member from cache");
            }
        }
        result
    }

    fn member_path(&self, member: &MemberId) -> String {
        format!("/guilds/{}/members/{}", self.id.as_str(), member.as_str())
    }

    fn member_role_path(&self, member: &MemberId, role: &RoleId) -> String {
        format!("{}/roles/{}", self.member_path(member), role.as_str())
    }
}

#[async_trait]
impl Guild for DiscordGuild {
    fn id(&self) -> &GuildId {
        &self.id
    }

    async fn roles_by_name(&self, name: &str) -> DirectoryResult<Vec<Role>> {
        let roles: Vec<Role> = self
            .http
            .get(&format!("/guilds/{}/roles", self.id.as_str()))
            .await?;
        Ok(roles.into_iter().filter(|r| r.name == name).collect())
    }

    async fn create_role(&self, name: &str, color: RoleColor) -> DirectoryResult<Role> {
        let role: Role = self
            .http
            .post(
                &format!("/guilds/{}/roles", self.id.as_str()),
                &CreateRoleRequest { name, color },
            )
            .await?;
        tracing::info!(role_id = %role.id, role = %role.name, color = %color, "Created role");
        Ok(role)
    }

    fn members_by_nickname(&self, name: &str) -> Vec<Member> {
        self.members
            .read()
            .values()
            .filter(|m| m.nickname_matches(name))
            .cloned()
            .collect()
    }

    async fn search_members_by_prefix(
        &self,
        prefix: &str,
        limit: usize,
    ) -> DirectoryResult<Vec<Member>> {
        let payload: Vec<GuildMemberPayload> = self
            .http
            .get_with_query(
                &format!("/guilds/{}/members/search", self.id.as_str()),
                &[("query", prefix.to_string()), ("limit", limit.to_string())],
            )
            .await?;
        let members: Vec<Member> = payload.into_iter().map(Member::from).collect();
        self.cache_members(&members);
        Ok(members)
    }

    async fn add_role(&self, member: &MemberId, role: &RoleId) -> DirectoryResult<()> {
        let result = self.http.put_empty(&self.member_role_path(member, role)).await;
        self.evict_if_missing(member, result)?;
        self.update_cached(member, |m| {
            m.roles.insert(role.clone());
        });
        Ok(())
    }

    async fn remove_role(&self, member: &MemberId, role: &RoleId) -> DirectoryResult<()> {
        let result = self.http.delete_empty(&self.member_role_path(member, role)).await;
        self.evict_if_missing(member, result)?;
        self.update_cached(member, |m| {
            m.roles.remove(role);
        });
        Ok(())
    }

    async fn load_members(&self) -> DirectoryResult<Vec<Member>> {
        let path = format!("/guilds/{}/members", self.id.as_str());
        let mut members: Vec<Member> = Vec::new();
        let mut after: Option<MemberId> = None;

        loop {
            let mut query = vec![("limit", self.page_size.to_string())];
            if let Some(after) = &after {
                query.push(("after", after.as_str().to_string()));
            }

            let page: Vec<GuildMemberPayload> = self.http.get_with_query(&path, &query).await?;
            let page_len = page.len();
            members.extend(page.into_iter().map(Member::from));

            if page_len < self.page_size {
                break;
            }
            after = members.last().map(|m| m.id.clone());
        }

        *self.members.write() = members
            .iter()
            .map(|m| (m.id.clone(), m.clone()))
            .collect();
        *self.refreshed_at.lock() = Some(Instant::now());
        Ok(members)
    }

    async fn set_member_roles(
        &self,
        member: &MemberId,
        roles: &BTreeSet<RoleId>,
    ) -> DirectoryResult<()> {
        let result = self
            .http
            .patch(
                &self.member_path(member),
                &ModifyMemberRolesRequest { roles },
            )
            .await;
        let updated: GuildMemberPayload = self.evict_if_missing(member, result)?;
        self.cache_members(&[Member::from(updated)]);
        Ok(())
    }
}
