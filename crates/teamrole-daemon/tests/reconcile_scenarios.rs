//! End-to-end reconciliation scenarios against the in-memory directory

use std::sync::Arc;
use std::time::Duration;
use teamrole_daemon::config::{DaemonConfig, OverlapPolicy};
use teamrole_daemon::directory::{DirectoryCall, InMemoryDirectory, InMemoryGuild};
use teamrole_daemon::roster::StaticRoster;
use teamrole_daemon::scheduler::{Reconciler, TickSummary};
use teamrole_daemon::Server;
use teamrole_types::{Member, MemberId, Role, RoleColor};

struct Harness {
    directory: Arc<InMemoryDirectory>,
    roster: Arc<StaticRoster>,
    reconciler: Reconciler,
}

impl Harness {
    fn new() -> Self {
        Self::with_policy(OverlapPolicy::LastWins)
    }

    fn with_policy(policy: OverlapPolicy) -> Self {
        let mut config = DaemonConfig::development();
        config.scheduler.overlap_policy = policy;

        let directory = Arc::new(InMemoryDirectory::new(config.guild()));
        let roster = Arc::new(StaticRoster::new());
        let reconciler = Reconciler::new(directory.clone(), roster.clone(), &config);

        Self {
            directory,
            roster,
            reconciler,
        }
    }

    fn guild(&self) -> Arc<InMemoryGuild> {
        self.directory.guild_state()
    }

    /// Run a tick and wait for everything it dispatched
    async fn tick(&self) -> TickSummary {
        let summary = self.reconciler.tick().await.unwrap();
        self.reconciler.dispatcher().settle().await;
        summary
    }

    fn roles_named(&self, name: &str) -> Vec<Role> {
        self.guild()
            .roles()
            .into_iter()
            .filter(|r| r.name == name)
            .collect()
    }

    fn member(&self, id: &str) -> Member {
        self.guild().member(&MemberId::new(id)).unwrap()
    }

    fn searches(&self) -> usize {
        self.guild()
            .calls()
            .iter()
            .filter(|c| matches!(c, DirectoryCall::SearchMembers { .. }))
            .count()
    }
}

#[tokio::test]
async fn alice_switches_to_red_and_bob_joins_blue() {
    let h = Harness::new();
    let guild = h.guild();
    let blue = guild.insert_role("Blue", RoleColor::BLUE);
    guild.insert_member(
        Member::new("1", "alice_mc").with_nickname("alice").with_role(blue.id.clone()),
        true,
    );
    guild.insert_member(Member::new("2", "bob_mc").with_nickname("bob"), false);
    guild.insert_member(
        Member::new("3", "carol_mc").with_nickname("carol").with_role(blue.id.clone()),
        true,
    );
    h.roster.set_team("Red", ["alice"]).await;
    h.roster.set_team("Blue", ["bob"]).await;

    h.tick().await;
    h.tick().await;

    let creates: Vec<DirectoryCall> = guild
        .calls()
        .into_iter()
        .filter(|c| matches!(c, DirectoryCall::CreateRole { .. }))
        .collect();
    assert_eq!(
        creates,
        vec![DirectoryCall::CreateRole {
            name: "Red".to_string(),
            color: RoleColor::RED,
        }]
    );

    let red = h.roles_named("Red");
    assert_eq!(red.len(), 1);

    let alice = h.member("1");
    assert!(alice.has_role(&red[0].id));
    assert!(!alice.has_role(&blue.id));
    assert!(h.member("2").has_role(&blue.id));

    // Not in either roster
    let carol = h.member("3");
    assert!(carol.has_role(&blue.id));
    assert!(!guild.calls().iter().any(|c| matches!(
        c,
        DirectoryCall::AddRole { member, .. } | DirectoryCall::RemoveRole { member, .. }
            if member == &MemberId::new("3")
    )));
}

#[tokio::test]
async fn converged_directory_sees_no_mutations() {
    let h = Harness::new();
    let guild = h.guild();
    guild.insert_member(Member::new("1", "alice_mc").with_nickname("alice"), true);
    guild.insert_member(Member::new("2", "bob_mc").with_nickname("bob"), true);
    h.roster.set_team("Red", ["alice"]).await;
    h.roster.set_team("Blue", ["bob"]).await;

    // Creates both roles, then assigns them
    h.tick().await;
    h.tick().await;
    guild.clear_calls();

    let summary = h.tick().await;
    assert!(guild.mutation_calls().is_empty());
    assert_eq!(summary.red.changes_dispatched, 0);
    assert_eq!(summary.blue.changes_dispatched, 0);
}

#[tokio::test]
async fn empty_rosters_issue_no_member_mutations() {
    let h = Harness::new();
    let guild = h.guild();
    guild.insert_role("Red", RoleColor::RED);
    guild.insert_role("Blue", RoleColor::BLUE);
    guild.insert_member(Member::new("1", "alice_mc").with_nickname("alice"), true);

    let summary = h.tick().await;
    assert!(guild.mutation_calls().is_empty());
    assert_eq!(h.searches(), 0);
    assert_eq!(summary.red.entries + summary.blue.entries, 0);
}

#[tokio::test]
async fn cache_hit_skips_search_and_miss_searches_once() {
    let h = Harness::new();
    let guild = h.guild();
    guild.insert_role("Red", RoleColor::RED);
    guild.insert_role("Blue", RoleColor::BLUE);
    guild.insert_member(Member::new("1", "alice_mc").with_nickname("alice"), true);
    guild.insert_member(Member::new("2", "dave_mc").with_nickname("dave"), false);

    h.roster.set_team("Red", ["alice"]).await;
    h.tick().await;
    assert_eq!(h.searches(), 0);

    h.roster.set_team("Red", ["alice", "dave"]).await;
    h.tick().await;
    assert_eq!(h.searches(), 1);

    // The search cached dave
    h.tick().await;
    assert_eq!(h.searches(), 1);
    assert!(guild.is_cached(&MemberId::new("2")));
}

#[tokio::test]
async fn unknown_entry_searches_every_tick_without_mutating() {
    let h = Harness::new();
    let guild = h.guild();
    guild.insert_role("Red", RoleColor::RED);
    guild.insert_role("Blue", RoleColor::BLUE);
    h.roster.set_team("Red", ["ghost"]).await;

    h.tick().await;
    h.tick().await;
    assert_eq!(h.searches(), 2);
    assert!(guild.mutation_calls().is_empty());
}

#[tokio::test]
async fn duplicate_roles_first_granted_all_removed() {
    let h = Harness::new();
    let guild = h.guild();
    let red_a = guild.insert_role("Red", RoleColor::RED);
    let red_b = guild.insert_role("Red", RoleColor::RED);
    let blue_a = guild.insert_role("Blue", RoleColor::BLUE);
    let blue_b = guild.insert_role("Blue", RoleColor::BLUE);
    guild.insert_member(
        Member::new("1", "alice_mc")
            .with_nickname("alice")
            .with_role(red_a.id.clone())
            .with_role(red_b.id.clone()),
        true,
    );
    guild.insert_member(Member::new("2", "bob_mc").with_nickname("bob"), true);
    h.roster.set_team("Blue", ["alice"]).await;
    h.roster.set_team("Red", ["bob"]).await;

    h.tick().await;

    let alice = h.member("1");
    assert!(alice.has_role(&blue_a.id));
    assert!(!alice.has_role(&blue_b.id));
    assert!(!alice.has_role(&red_a.id));
    assert!(!alice.has_role(&red_b.id));

    let bob = h.member("2");
    assert!(bob.has_role(&red_a.id));
    assert!(!bob.has_role(&red_b.id));
}

#[tokio::test]
async fn overlap_last_wins_leaves_blue() {
    let h = Harness::new();
    let guild = h.guild();
    let red = guild.insert_role("Red", RoleColor::RED);
    let blue = guild.insert_role("Blue", RoleColor::BLUE);
    guild.insert_member(
        Member::new("1", "erin_mc").with_nickname("erin").with_role(red.id.clone()),
        true,
    );
    h.roster.set_team("Red", ["erin"]).await;
    h.roster.set_team("Blue", ["erin"]).await;

    let summary = h.tick().await;
    assert_eq!(summary.overlapping_entries, vec!["erin".to_string()]);
    let erin = h.member("1");
    assert!(erin.has_role(&blue.id));
    assert!(!erin.has_role(&red.id));

    // Stays put
    guild.clear_calls();
    h.tick().await;
    assert!(guild.mutation_calls().is_empty());
}

#[tokio::test]
async fn overlap_skip_leaves_member_untouched() {
    let h = Harness::with_policy(OverlapPolicy::Skip);
    let guild = h.guild();
    let red = guild.insert_role("Red", RoleColor::RED);
    guild.insert_role("Blue", RoleColor::BLUE);
    guild.insert_member(
        Member::new("1", "erin_mc").with_nickname("erin").with_role(red.id.clone()),
        true,
    );
    h.roster.set_team("Red", ["erin"]).await;
    h.roster.set_team("Blue", ["erin"]).await;

    let summary = h.tick().await;
    assert_eq!(summary.overlapping_entries.len(), 1);
    assert!(guild.mutation_calls().is_empty());
    assert!(h.member("1").has_role(&red.id));
}

#[tokio::test]
async fn unavailable_guild_is_a_noop() {
    let h = Harness::new();
    h.directory.set_guild_available(false);
    h.roster.set_team("Red", ["alice"]).await;

    let summary = h.tick().await;
    assert!(!summary.guild_available);
    assert!(h.guild().calls().is_empty());
}

#[tokio::test]
async fn deleted_role_is_recreated_once() {
    let h = Harness::new();
    let guild = h.guild();

    h.tick().await;
    assert_eq!(guild.roles().len(), 2);

    let red = h.roles_named("Red").remove(0);
    guild.delete_role(&red.id);
    guild.clear_calls();

    h.tick().await;
    h.tick().await;
    assert_eq!(guild.mutation_calls().len(), 1);
    assert_eq!(h.roles_named("Red").len(), 1);
}

#[tokio::test]
async fn server_shutdown_drains_and_disconnects() {
    let mut config = DaemonConfig::development();
    config.api.enabled = false;

    let directory = Arc::new(InMemoryDirectory::new(config.guild()));
    let guild = directory.guild_state();
    let red = guild.insert_role("Red", RoleColor::RED);
    let blue = guild.insert_role("Blue", RoleColor::BLUE);
    let moderator = guild.insert_role("Moderator", RoleColor::default());
    guild.insert_member(
        Member::new("1", "alice_mc")
            .with_nickname("alice")
            .with_role(moderator.id.clone()),
        true,
    );
    // Holds a managed role without being on any roster
    guild.insert_member(
        Member::new("2", "zoe_mc").with_role(blue.id.clone()),
        false,
    );
    let roster = Arc::new(StaticRoster::new());
    roster.set_team("Red", ["alice"]).await;

    let server = Server::with_components(config, directory.clone(), roster);
    let scheduler = server.scheduler().clone();

    let signal = {
        let scheduler = scheduler.clone();
        let guild = guild.clone();
        let red = red.id.clone();
        async move {
            while scheduler.status().ticks < 1 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            scheduler.reconciler().dispatcher().settle().await;
            let alice = guild.member(&MemberId::new("1")).unwrap();
            assert!(alice.has_role(&red));
        }
    };
    server.run_until(signal).await.unwrap();

    let alice = guild.member(&MemberId::new("1")).unwrap();
    assert!(!alice.has_role(&red.id));
    assert!(alice.has_role(&moderator.id));
    assert!(!guild.member(&MemberId::new("2")).unwrap().has_role(&blue.id));
    assert!(!directory.is_connected());
    assert!(!scheduler.is_running());
}

#[tokio::test(start_paused = true)]
async fn grant_from_a_slow_search_cannot_outlive_the_drain() {
    let mut config = DaemonConfig::development();
    config.api.enabled = false;

    let directory = Arc::new(InMemoryDirectory::new(config.guild()));
    let guild = directory.guild_state();
    let red = guild.insert_role("Red", RoleColor::RED);
    guild.insert_member(Member::new("2", "bob_mc").with_nickname("bob"), false);
    guild.delay_searches(Duration::from_secs(5));
    let roster = Arc::new(StaticRoster::new());
    roster.set_team("Red", ["bob"]).await;

    let server = Server::with_components(config, directory.clone(), roster);
    let scheduler = server.scheduler().clone();

    // Shut down while the search for bob is still running
    let signal = async move {
        while scheduler.status().ticks < 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    server.run_until(signal).await.unwrap();

    let bob = MemberId::new("2");
    assert!(!guild.member(&bob).unwrap().has_role(&red.id));

    let calls = guild.calls();
    let granted = calls
        .iter()
        .position(|c| matches!(c, DirectoryCall::AddRole { member, .. } if member == &bob))
        .expect("search should have completed and granted Red");
    let stripped = calls
        .iter()
        .position(|c| matches!(c, DirectoryCall::SetMemberRoles { member, .. } if member == &bob))
        .expect("drain should have stripped bob");
    assert!(granted < stripped);
    assert!(!directory.is_connected());
}
