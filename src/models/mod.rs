// Document models. Every document serializes camelCase with epoch-millisecond timestamps.

pub mod business;
pub mod common;
pub mod daily_service;
pub mod feed;
pub mod request;
pub mod society;
pub mod user;
pub mod validation;
pub mod wholesale_deal;

pub use business::{Business, BusinessPatch, BusinessPatchRequest, CatalogueItem, NewBusiness};
pub use common::{
    Comment, DeliveryInfo, OrderPointer, OrderStatus, Report, Review, SourceType, SubOrder,
    VerificationStatus,
};
pub use daily_service::{DailyService, NewDailyService};
pub use feed::{Feed, FeedKind, FeedPatch, FeedPatchRequest, FeedType, NewFeed, PollOption, Rsvp, Vote};
pub use request::{NewUserRequest, RequestStatusUpdate, UserRequest};
pub use society::{NewSociety, Society};
pub use user::{NewUser, Role, SocietySnapshot, User, UserPatch, UserPatchRequest};
pub use wholesale_deal::{DealPatch, DealPatchRequest, DealPrice, DealStatus, NewDeal, WholesaleDeal};
