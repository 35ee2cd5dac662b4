use crate::error::ApiErrorBody;
use crate::models::{Booking, BookingPatch};
use crate::sites::SiteProfile;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::create_booking,
        crate::routes::list_bookings,
        crate::routes::get_booking,
        crate::routes::update_booking,
        crate::routes::delete_booking,
        crate::routes::get_site,
    ),
    components(schemas(
        Booking, BookingPatch, SiteProfile, ApiErrorBody,
        crate::routes::CreateBookingRequest, crate::routes::CreatedResponse,
        crate::routes::OkResponse, crate::routes::BookingResponse,
        crate::routes::BookingListResponse, crate::routes::SiteResponse
    )),
    tags(
        (name = "bookings", description = "Booking intake and admin review"),
        (name = "sites", description = "Public site profiles"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_responses_reference_the_envelope() {
        let doc = serde_json::to_value(ApiDoc::openapi()).unwrap();
        assert!(doc["components"]["schemas"]["ApiErrorBody"].is_object());
        let list = &doc["paths"]["/v1/bookings"]["get"];
        assert_eq!(
            list["responses"]["401"]["content"]["application/json"]["schema"]["$ref"],
            "#/components/schemas/ApiErrorBody"
        );
        let names: Vec<_> = list["parameters"].as_array().unwrap().iter().map(|p| p["name"].clone()).collect();
        assert!(names.contains(&serde_json::json!("includeDeleted")));
    }
}
