//! Fully-qualified gRPC operation names (`/package.Service/Method`).
//!
//! These names are the keys of the exemption registry and the action passed to
//! the authorization policy, on every front-end.

pub const SERVICE_NAME: &str = "miniblog.v1.MiniBlog";

pub const HEALTHZ: &str = "/miniblog.v1.MiniBlog/Healthz";
pub const LOGIN: &str = "/miniblog.v1.MiniBlog/Login";
pub const REFRESH_TOKEN: &str = "/miniblog.v1.MiniBlog/RefreshToken";
pub const CHANGE_PASSWORD: &str = "/miniblog.v1.MiniBlog/ChangePassword";
pub const CREATE_USER: &str = "/miniblog.v1.MiniBlog/CreateUser";
pub const UPDATE_USER: &str = "/miniblog.v1.MiniBlog/UpdateUser";
pub const DELETE_USER: &str = "/miniblog.v1.MiniBlog/DeleteUser";
pub const GET_USER: &str = "/miniblog.v1.MiniBlog/GetUser";
pub const LIST_USER: &str = "/miniblog.v1.MiniBlog/ListUser";
pub const CREATE_POST: &str = "/miniblog.v1.MiniBlog/CreatePost";
pub const UPDATE_POST: &str = "/miniblog.v1.MiniBlog/UpdatePost";
pub const DELETE_POST: &str = "/miniblog.v1.MiniBlog/DeletePost";
pub const GET_POST: &str = "/miniblog.v1.MiniBlog/GetPost";
pub const LIST_POST: &str = "/miniblog.v1.MiniBlog/ListPost";

/// Every operation the service exposes, in declaration order.
pub const ALL: [&str; 14] = [
    HEALTHZ,
    LOGIN,
    REFRESH_TOKEN,
    CHANGE_PASSWORD,
    CREATE_USER,
    UPDATE_USER,
    DELETE_USER,
    GET_USER,
    LIST_USER,
    CREATE_POST,
    UPDATE_POST,
    DELETE_POST,
    GET_POST,
    LIST_POST,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_scoped_to_the_service() {
        for op in ALL {
            let method = op
                .strip_prefix('/')
                .and_then(|rest| rest.strip_prefix(SERVICE_NAME))
                .and_then(|rest| rest.strip_prefix('/'));
            assert!(method.is_some_and(|m| !m.is_empty()), "bad operation {op}");
        }
    }
}
