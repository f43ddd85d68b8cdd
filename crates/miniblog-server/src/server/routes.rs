//! REST route table shared by the gateway and the plain HTTP front-end.
//!
//! The HTTP middleware maps a matched route back to its operation name so the
//! exemption registry and the authorization policy see the same action on
//! every front-end.

use http::Method;
use miniblog_core::operations;

pub const HEALTHZ: &str = "/healthz";
pub const LOGIN: &str = "/login";
pub const REFRESH_TOKEN: &str = "/refresh-token";
pub const USERS: &str = "/v1/users";
pub const USER: &str = "/v1/users/{user_id}";
pub const CHANGE_PASSWORD: &str = "/v1/users/{user_id}/change-password";
pub const POSTS: &str = "/v1/posts";
pub const POST: &str = "/v1/posts/{post_id}";

#[derive(Clone, Debug)]
pub struct Route {
    pub method: Method,
    pub path: &'static str,
    pub operation: &'static str,
}

const fn route(method: Method, path: &'static str, operation: &'static str) -> Route {
    Route {
        method,
        path,
        operation,
    }
}

pub static ROUTES: [Route; 14] = [
    route(Method::GET, HEALTHZ, operations::HEALTHZ),
    route(Method::POST, LOGIN, operations::LOGIN),
    route(Method::PUT, REFRESH_TOKEN, operations::REFRESH_TOKEN),
    route(Method::PUT, CHANGE_PASSWORD, operations::CHANGE_PASSWORD),
    route(Method::POST, USERS, operations::CREATE_USER),
    route(Method::PUT, USER, operations::UPDATE_USER),
    route(Method::DELETE, USER, operations::DELETE_USER),
    route(Method::GET, USER, operations::GET_USER),
    route(Method::GET, USERS, operations::LIST_USER),
    route(Method::POST, POSTS, operations::CREATE_POST),
    route(Method::PUT, POST, operations::UPDATE_POST),
    route(Method::DELETE, POSTS, operations::DELETE_POST),
    route(Method::GET, POST, operations::GET_POST),
    route(Method::GET, POSTS, operations::LIST_POST),
];

/// Operation served by `method` on the matched route template `path`.
pub fn operation_for(method: &Method, path: &str) -> Option<&'static str> {
    ROUTES
        .iter()
        .find(|r| r.method == *method && r.path == path)
        .map(|r| r.operation)
}
