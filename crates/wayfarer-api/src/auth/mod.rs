//! Authentication and authorization module
//!
//! This module provides JWT-based authentication with the following components:
//! - Token issuing and verification (access and refresh secrets)
//! - Password hashing with Argon2id
//! - Single refresh session per user
//! - One-time password reset tickets
//! - Middleware pipeline for request authentication and role checks
//! - Authentication service composing the above
//! - Repository layer for PostgreSQL

pub mod cookie;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;
pub mod repository;
pub mod reset;
pub mod service;
pub mod session;

pub use jwt::{Claims, JwtError, TokenIssuer, TokenKind, VerifiedToken};
pub use middleware::{
    authenticate, optional_auth, require_auth, restrict_to, AuthContext, AuthError, CurrentUser,
};
pub use models::{
    AuthResponse, ForgotPasswordRequest, LoginRequest, RefreshRequest, RefreshResponse,
    ResetPasswordRequest, SignupRequest, TokenPair, UpdateMeRequest, UpdatePasswordRequest, User,
    UserPublic,
};
pub use password::{hash_password, validate_password_strength, verify_password};
pub use repository::{
    PgSessionRepository, PgUserRepository, RepositoryError, SessionRepository, UserRepository,
};
pub use reset::{PasswordResetFlow, ResetError};
pub use service::AuthService;
pub use session::{hash_token, RefreshSessionStore};
