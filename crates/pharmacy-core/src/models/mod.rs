//! Data models for the pharmacy REST API.
//!
//! This module contains the wire types exchanged with the backend:
//!
//! - Auth DTOs: registration, login, token refresh, password reset/change
//! - `User`, `Role`, `UserProfile`: identity and profile records
//! - `Drug`: catalogue entries
//! - `Prescription`, `PrescriptionRequest`: a user's prescriptions

pub mod auth;
pub mod drug;
pub mod prescription;
pub mod timestamp;
pub mod user;

pub use auth::{
    ErrorResponse, LoginRequest, LoginResponse, PasswordChangeRequest, PasswordChangeResponse,
    PasswordResetConfirm, PasswordResetRequest, PasswordResetResponse, RefreshTokenRequest,
    RefreshTokenResponse, RegistrationRequest, RegistrationResponse,
};
pub use drug::Drug;
pub use prescription::{Prescription, PrescriptionRequest};
pub use user::{Role, User, UserProfile, UserProfileUpdate};
