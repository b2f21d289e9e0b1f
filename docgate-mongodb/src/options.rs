//! Translation of access-layer options into `mongodb` option structs.

use mongodb::options::{
    AggregateOptions as MongoAggregateOptions, ClientOptions, CountOptions as MongoCountOptions,
    Credential, FindOneAndDeleteOptions as MongoFindOneAndDeleteOptions,
    FindOneAndReplaceOptions as MongoFindOneAndReplaceOptions,
    FindOneAndUpdateOptions as MongoFindOneAndUpdateOptions, FindOneOptions as MongoFindOneOptions,
    FindOptions as MongoFindOptions, ReadPreference, ReturnDocument as MongoReturnDocument,
    SelectionCriteria,
};

use docgate_core::driver::{
    AggregateOptions, ConnectOptions, CountOptions, FindOneAndDeleteOptions, FindOneAndReplaceOptions,
    FindOneAndUpdateOptions, FindOneOptions, FindOptions, ReturnDocument,
};

/// Applies pool, timeout, credential and read-preference settings.
///
/// Server selection is bounded by the connect timeout so an unreachable deployment
/// fails within the client's timeout instead of the driver's 30 second default.
pub fn apply_connect_options(client_options: &mut ClientOptions, options: &ConnectOptions) {
    client_options.max_pool_size = Some(options.max_pool_size);
    client_options.connect_timeout = Some(options.connect_timeout);
    client_options.server_selection_timeout = Some(options.connect_timeout);
    client_options.max_idle_time = Some(options.max_idle_time);

    if let Some((username, password)) = &options.credential {
        let mut credential = Credential::default();
        credential.username = Some(username.clone());
        credential.password = Some(password.clone());
        client_options.credential = Some(credential);
    }

    if options.secondary_preferred {
        client_options.selection_criteria = Some(SelectionCriteria::ReadPreference(
            ReadPreference::SecondaryPreferred {
                options: Default::default(),
            },
        ));
    }
}

fn return_document(value: ReturnDocument) -> MongoReturnDocument {
    match value {
        ReturnDocument::Before => MongoReturnDocument::Before,
        ReturnDocument::After => MongoReturnDocument::After,
    }
}

pub(crate) fn find(options: FindOptions) -> MongoFindOptions {
    let mut find = MongoFindOptions::default();
    find.sort = options.sort;
    find.skip = options.skip;
    find.limit = options.limit;
    find.projection = options.projection;
    find.batch_size = options.batch_size;
    find
}

pub(crate) fn find_one(options: FindOneOptions) -> MongoFindOneOptions {
    let mut find = MongoFindOneOptions::default();
    find.sort = options.sort;
    find.skip = options.skip;
    find.projection = options.projection;
    find
}

pub(crate) fn find_one_and_update(options: FindOneAndUpdateOptions) -> MongoFindOneAndUpdateOptions {
    let mut find = MongoFindOneAndUpdateOptions::default();
    find.sort = options.sort;
    find.upsert = options.upsert;
    find.return_document = options.return_document.map(return_document);
    find.projection = options.projection;
    find
}

pub(crate) fn find_one_and_replace(options: FindOneAndReplaceOptions) -> MongoFindOneAndReplaceOptions {
    let mut find = MongoFindOneAndReplaceOptions::default();
    find.sort = options.sort;
    find.upsert = options.upsert;
    find.return_document = options.return_document.map(return_document);
    find.projection = options.projection;
    find
}

pub(crate) fn find_one_and_delete(options: FindOneAndDeleteOptions) -> MongoFindOneAndDeleteOptions {
    let mut find = MongoFindOneAndDeleteOptions::default();
    find.sort = options.sort;
    find.projection = options.projection;
    find
}

pub(crate) fn count(options: CountOptions) -> MongoCountOptions {
    let mut count = MongoCountOptions::default();
    count.skip = options.skip;
    count.limit = options.limit;
    count
}

pub(crate) fn aggregate(options: AggregateOptions) -> MongoAggregateOptions {
    let mut aggregate = MongoAggregateOptions::default();
    aggregate.batch_size = options.batch_size;
    aggregate.allow_disk_use = options.allow_disk_use;
    aggregate
}
