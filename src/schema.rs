diesel::table! {
    hotels (id) {
        id -> Integer,
        name -> Text,
        hotel_type -> Text,
    }
}

diesel::table! {
    countries (id) {
        id -> Integer,
        name -> Text,
    }
}

diesel::table! {
    bookings (id) {
        id -> Integer,
        hotel_id -> Integer,
        country_id -> Integer,
        is_canceled -> Bool,
        lead_time -> Integer,
        arrival_date -> Date,
        departure_date -> Nullable<Date>,
        adr -> Double,
        total_nights -> Integer,
    }
}

diesel::table! {
    query_history (id) {
        id -> Integer,
        query_text -> Text,
        response_text -> Text,
        timestamp -> Timestamp,
        execution_time_ms -> Double,
    }
}

diesel::joinable!(bookings -> hotels (hotel_id));
diesel::joinable!(bookings -> countries (country_id));

diesel::allow_tables_to_appear_in_same_query!(bookings, hotels, countries,);
