mod grant;
mod requests;

pub use grant::{DeviceGrant, GrantStatus, IssuedTokens};
pub use requests::{
    ActivateAction, ActivateForm, ActivateParams, DeviceCodeForm, DeviceCodeResponse,
    HealthResponse, TokenForm, TokenResponse, UserInfoResponse,
};
