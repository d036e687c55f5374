use branch_defs::{
    BranchCreation, BranchRepository, ProtectionUpdate, RefCreation, RefLookup, RemoteApi,
    RemoteBranchRepository, RemoteError, RepositoryError,
};
use branch_defs_github::GitHubClient;
use serde_json::{Value, json};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MAIN_SHA: &str = "aa218f56b14c9653891f9e74264a383fa43fefbd";

fn client_for(server: &MockServer) -> GitHubClient {
    GitHubClient::new(Some("test-token".into()), Some(server.uri()))
}

fn lookup(reference: &str) -> RefLookup {
    RefLookup {
        owner: "test-owner".into(),
        repo: "test-repo".into(),
        reference: reference.into(),
    }
}

async fn mount_not_found(server: &MockServer, ref_path: &str) {
    Mock::given(method("GET"))
        .and(path(ref_path))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_raw(include_str!("fixtures/not_found.json"), "application/json"),
        )
        .mount(server)
        .await;
}

async fn mount_main(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/repos/test-owner/test-repo/git/ref/heads/main"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(include_str!("fixtures/ref_main.json"), "application/json"),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn get_ref_sends_credentials_and_headers() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/test-owner/test-repo/git/ref/heads/main"))
        .and(header("Authorization", "Bearer test-token"))
        .and(header("User-Agent", "branch-def-sync"))
        .and(header("Accept", "application/vnd.github+json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(include_str!("fixtures/ref_main.json"), "application/json"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let response = client_for(&server)
        .get_ref(&lookup("heads/main"))
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.data["object"]["sha"], MAIN_SHA);
}

#[tokio::test]
async fn missing_ref_is_a_404_status_error() {
    let server = MockServer::start().await;
    mount_not_found(&server, "/repos/test-owner/test-repo/git/ref/heads/nope").await;

    let err = client_for(&server)
        .get_ref(&lookup("heads/nope"))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        RemoteError::Status {
            status: 404,
            message: "Not Found".into()
        }
    );
}

#[tokio::test]
async fn non_json_error_body_is_used_as_message() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/test-owner/test-repo/git/ref/heads/main"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .get_ref(&lookup("heads/main"))
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(502));
    assert_eq!(err.to_string(), "HTTP 502: bad gateway");
}

#[tokio::test]
async fn create_ref_posts_ref_and_sha() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/repos/test-owner/test-repo/git/refs"))
        .and(body_json(json!({ "ref": "refs/heads/develop", "sha": MAIN_SHA })))
        .respond_with(ResponseTemplate::new(201).set_body_raw(
            include_str!("fixtures/ref_develop_created.json"),
            "application/json",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let response = client_for(&server)
        .create_ref(&RefCreation {
            owner: "test-owner".into(),
            repo: "test-repo".into(),
            reference: "refs/heads/develop".into(),
            sha: MAIN_SHA.into(),
        })
        .await
        .unwrap();

    assert_eq!(response.status, 201);
    assert_eq!(response.data["ref"], "refs/heads/develop");
}

#[tokio::test]
async fn protection_body_excludes_identity_fields() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/repos/test-owner/test-repo/branches/develop/protection"))
        .and(body_json(json!({ "enforce_admins": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "url": "x" })))
        .expect(1)
        .mount(&server)
        .await;

    let Value::Object(params) = json!({
        "enforce_admins": true,
        "owner": "test-owner",
        "repo": "test-repo",
        "branch": "develop",
    }) else {
        panic!("expected an object");
    };

    let response = client_for(&server)
        .update_branch_protection(&ProtectionUpdate { params })
        .await
        .unwrap();

    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn unreachable_host_is_a_transport_error() {
    let client = GitHubClient::new(None, Some("http://127.0.0.1:1".into()));

    let err = client.get_ref(&lookup("heads/main")).await.unwrap_err();

    assert!(matches!(err, RemoteError::Transport(_)));
    assert_eq!(err.status(), None);
}

#[tokio::test]
async fn repository_creates_branch_from_base_head() {
    let server = MockServer::start().await;
    mount_not_found(&server, "/repos/test-owner/test-repo/git/ref/heads/develop").await;
    mount_main(&server).await;

    Mock::given(method("POST"))
        .and(path("/repos/test-owner/test-repo/git/refs"))
        .and(body_json(json!({ "ref": "refs/heads/develop", "sha": MAIN_SHA })))
        .respond_with(ResponseTemplate::new(201).set_body_raw(
            include_str!("fixtures/ref_develop_created.json"),
            "application/json",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let repository = RemoteBranchRepository::new("test-owner", "test-repo", client_for(&server));

    let outcome = repository.create_branch("develop", "main").await.unwrap();
    assert_eq!(outcome, BranchCreation::Created);
}

#[tokio::test]
async fn repository_never_posts_when_base_is_missing() {
    let server = MockServer::start().await;
    mount_not_found(&server, "/repos/test-owner/test-repo/git/ref/heads/develop").await;
    mount_not_found(&server, "/repos/test-owner/test-repo/git/ref/heads/B").await;

    Mock::given(method("POST"))
        .and(path("/repos/test-owner/test-repo/git/refs"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let repository = RemoteBranchRepository::new("test-owner", "test-repo", client_for(&server));

    let err = repository.create_branch("develop", "B").await.unwrap_err();
    assert_eq!(
        err,
        RepositoryError::MissingBase {
            branch: "develop".into(),
            base: "B".into(),
        }
    );
}

#[tokio::test]
async fn repository_surfaces_lookup_failures() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/test-owner/test-repo/git/ref/heads/develop"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({ "message": "Forbidden" })),
        )
        .mount(&server)
        .await;

    let repository = RemoteBranchRepository::new("test-owner", "test-repo", client_for(&server));

    let err = repository.get_branch("develop").await.unwrap_err();
    assert_eq!(err.to_string(), "Error when trying to check for branch: 403: Forbidden");
}

#[tokio::test]
async fn repository_reports_rejected_protection() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/repos/test-owner/test-repo/branches/develop/protection"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({ "message": "Validation Failed" })),
        )
        .mount(&server)
        .await;

    let repository = RemoteBranchRepository::new("test-owner", "test-repo", client_for(&server));

    let err = repository
        .set_branch_permission("develop", &json!({ "enforce_admins": "maybe" }))
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "Error when trying to set permission for the branch develop: HTTP 422: Validation Failed"
    );
}

#[tokio::test]
async fn branch_names_are_encoded_in_paths() {
    let server = MockServer::start().await;
    mount_not_found(&server, "/repos/test-owner/test-repo/git/ref/heads/fix%2312").await;
    mount_main(&server).await;

    Mock::given(method("POST"))
        .and(path("/repos/test-owner/test-repo/git/refs"))
        .and(body_json(json!({ "ref": "refs/heads/fix#12", "sha": MAIN_SHA })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "ref": "refs/heads/fix#12",
            "object": { "sha": MAIN_SHA }
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/repos/test-owner/test-repo/branches/fix%2312/protection"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let repository = RemoteBranchRepository::new("test-owner", "test-repo", client_for(&server));

    let outcome = repository.create_branch("fix#12", "main").await.unwrap();
    assert_eq!(outcome, BranchCreation::Created);
    repository
        .set_branch_permission("fix#12", &json!({ "enforce_admins": true }))
        .await
        .unwrap();

    let paths: Vec<String> = server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| r.url.path().to_owned())
        .collect();
    assert!(!paths.iter().any(|p| p.ends_with("/heads/fix")));
    assert!(!paths.iter().any(|p| p.ends_with("/branches/fix")));
}

#[tokio::test]
async fn nested_branch_names_keep_ref_separators() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/test-owner/test-repo/git/ref/heads/feature/fix%2312"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ref": "refs/heads/feature/fix#12",
            "object": { "sha": MAIN_SHA }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let repository = RemoteBranchRepository::new("test-owner", "test-repo", client_for(&server));

    let found = repository.get_branch("feature/fix#12").await.unwrap().unwrap();
    assert_eq!(found.sha(), MAIN_SHA);
}
