use std::net::TcpListener;

use reqwest::{Client, Method, Response};

use sqlx::PgPool;

use uuid::Uuid;

use waitlist::app;
use waitlist::repo::{NewProfile, ProfilesRepo};
use waitlist::service::WaitlistService;

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

pub struct TestApp {
    addr: String,

    pub client: Client,
}

impl TestApp {
    pub async fn spawn(pool: &PgPool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to listen on random port");
        let port = listener.local_addr().unwrap().port();

        let addr = format!("http://127.0.0.1:{}", port);

        let service = WaitlistService::new(pool.clone(), false);

        let server =
            app::run(listener, pool.clone(), service).expect("Failed to spawn app instance");
        let _ = tokio::spawn(server);

        let client = Client::new();

        Self { addr, client }
    }

    pub fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", &self.addr, url);
        self.client.request(method, url)
    }

    pub fn authorized_request(
        &self,
        method: Method,
        url: &str,
        credentials: Option<&Credentials>,
    ) -> reqwest::RequestBuilder {
        let req = self.request(method, url);
        if let Some(creds) = credentials {
            req.basic_auth(creds.username.clone(), Some(creds.password.clone()))
        } else {
            req
        }
    }

    pub async fn health_check(&self) -> reqwest::Result<Response> {
        self.request(Method::GET, "health_check").send().await
    }

    pub async fn waitlist_join(&self, email: &str) -> reqwest::Result<Response> {
        self.request(Method::POST, "waitlist")
            .form(&[("email", email)])
            .send()
            .await
    }

    pub async fn waitlist_unsubscribe(&self, email: &str) -> reqwest::Result<Response> {
        self.request(Method::POST, "waitlist/unsubscribe")
            .form(&[("email", email)])
            .send()
            .await
    }

    pub async fn waitlist_stats(
        &self,
        credentials: Option<&Credentials>,
    ) -> reqwest::Result<Response> {
        self.authorized_request(Method::GET, "waitlist/stats", credentials)
            .send()
            .await
    }

    pub async fn waitlist_list(
        &self,
        credentials: Option<&Credentials>,
        query: &str,
    ) -> reqwest::Result<Response> {
        let url = format!("waitlist?{}", query);
        self.authorized_request(Method::GET, &url, credentials)
            .send()
            .await
    }

    pub async fn waitlist_export(
        &self,
        credentials: Option<&Credentials>,
    ) -> reqwest::Result<Response> {
        self.authorized_request(Method::GET, "waitlist/export", credentials)
            .send()
            .await
    }
}

#[derive(Debug, Clone)]
pub struct TestAdmin {
    pub id: Uuid,
    pub email: String,
    pub password: String,
}

impl TestAdmin {
    pub async fn register(pool: &PgPool, email: &str, password: &str) -> Self {
        use argon2::password_hash::SaltString;
        use argon2::{Argon2, PasswordHasher};

        let salt = SaltString::generate(&mut rand::thread_rng());

        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .expect("Failed to hash admin password")
            .to_string();

        let new_profile = NewProfile {
            email: email.parse().expect("Failed to parse email address"),
            password_hash,
        };

        let id = ProfilesRepo::insert(pool, &new_profile)
            .await
            .expect("Failed to insert test profile");

        let email = email.to_string();
        let password = password.to_string();
        Self {
            id,
            email,
            password,
        }
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            username: self.email.clone(),
            password: self.password.clone(),
        }
    }
}
